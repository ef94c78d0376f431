pub mod rate_import;
pub mod standard_reward;
