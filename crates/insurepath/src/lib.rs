//! InsurePath core: standard reward resolution for Japanese social insurance payroll,
//! the rate table bookkeeping around it, and the HTTP routes that expose both.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
