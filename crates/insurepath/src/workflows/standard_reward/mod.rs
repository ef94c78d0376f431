//! Standard reward resolution: rate table selection, band lookup, and the append-only
//! history of decided grades per employee.
//!
//! The calculator itself is pure. [`StandardRewardService`] wires it to the office,
//! rate table, and history repositories, and [`standard_reward_router`] exposes the
//! service over HTTP with the caller identified per request.

pub mod bands;
pub mod calculator;
pub mod domain;
pub mod export;
pub mod history;
pub mod repository;
pub mod router;
pub mod sanitize;
pub mod selector;
pub mod service;
pub mod session;
pub mod store;

#[cfg(test)]
mod tests;

pub use bands::{resolve_band, validate_bands, BandResolution, BandTableError};
pub use calculator::{calculate, ResolutionError, ResolutionErrors, StandardRewardResult};
pub use domain::{
    format_yen, Band, CloudRateTable, DecisionKind, Employee, EmployeeId, HealthPlan, HistoryId,
    InsuranceKind, Office, OfficeId, RateTable, RateTableDraft, RateTableId,
    StandardRewardHistory, YearMonth, YearMonthError, Yen, NO_UPPER_LIMIT,
};
pub use export::{snapshot_csv, snapshot_rows, ExportError, SnapshotRow};
pub use history::{pick_effective, pick_effective_for_kind};
pub use repository::{
    HistoryRepository, OfficeRepository, RateTableRepository, RepositoryError, TableWrite,
};
pub use router::{standard_reward_router, CalculationView};
pub use sanitize::{Payload, ToDocument};
pub use selector::select_table;
pub use service::{
    CommitOutcome, CommitRequest, EffectiveRewards, SaveOutcome, SeedOutcome,
    StandardRewardService, StandardRewardServiceError,
};
pub use session::{
    ProfileDirectory, SessionContext, SessionError, UserProfile, UserRole, USER_ID_HEADER,
};
pub use store::MemoryDocumentStore;
