use super::domain::{
    CloudRateTable, Employee, EmployeeId, InsuranceKind, Office, OfficeId, RateTable,
    RateTableId, StandardRewardHistory,
};

/// Office master data.
pub trait OfficeRepository: Send + Sync {
    fn fetch_office(&self, id: &OfficeId) -> Result<Option<Office>, RepositoryError>;
    fn upsert_office(&self, office: Office) -> Result<(), RepositoryError>;
}

/// Office-scoped rate tables plus the shared cloud catalog they are seeded from.
pub trait RateTableRepository: Send + Sync {
    fn tables_for_office(
        &self,
        office_id: &OfficeId,
        kind: InsuranceKind,
    ) -> Result<Vec<RateTable>, RepositoryError>;
    /// Stores `table` unless another table already holds its partition
    /// ([`RateTable::same_partition`]). With `overwrite` the holder is replaced in place,
    /// keeping its id and `created_at`. The lookup and the write are one atomic step.
    fn save_table(
        &self,
        table: RateTable,
        overwrite: bool,
    ) -> Result<TableWrite, RepositoryError>;
    fn cloud_tables(
        &self,
        kind: InsuranceKind,
        year: u16,
    ) -> Result<Vec<CloudRateTable>, RepositoryError>;
    fn save_cloud_table(&self, table: CloudRateTable) -> Result<(), RepositoryError>;
}

/// Result of a partition-unique table write.
#[derive(Debug, Clone, PartialEq)]
pub enum TableWrite {
    Created(RateTable),
    Replaced(RateTable),
    /// The partition is taken and overwrite was not requested.
    Duplicate(RateTableId),
}

/// Employees and their append-only standard reward history.
pub trait HistoryRepository: Send + Sync {
    fn append_history(
        &self,
        entry: StandardRewardHistory,
    ) -> Result<StandardRewardHistory, RepositoryError>;
    fn histories_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<StandardRewardHistory>, RepositoryError>;
    fn fetch_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    fn employees_for_office(&self, office_id: &OfficeId) -> Result<Vec<Employee>, RepositoryError>;
    fn upsert_employee(&self, employee: Employee) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored document could not be decoded: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Corrupt(value.to_string())
    }
}
