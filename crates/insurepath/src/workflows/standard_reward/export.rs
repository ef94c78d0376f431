use std::io::Write;

use serde::Serialize;

use super::domain::{Employee, InsuranceKind, StandardRewardHistory, YearMonth, Yen};
use super::history::pick_effective_for_kind;

/// One employee line of the standard reward snapshot export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRow {
    pub employee_code: String,
    pub name: String,
    pub as_of: YearMonth,
    pub health_grade: Option<u16>,
    pub health_standard_monthly: Option<Yen>,
    pub health_applied_from: Option<YearMonth>,
    pub pension_grade: Option<u16>,
    pub pension_standard_monthly: Option<Yen>,
    pub pension_applied_from: Option<YearMonth>,
}

/// Annotates each employee with the health and pension entries picked as of `as_of`.
pub fn snapshot_rows(
    employees: &[Employee],
    histories: &[StandardRewardHistory],
    as_of: YearMonth,
) -> Vec<SnapshotRow> {
    employees
        .iter()
        .map(|employee| {
            let own: Vec<StandardRewardHistory> = histories
                .iter()
                .filter(|entry| entry.employee_id == employee.id)
                .cloned()
                .collect();
            let health = pick_effective_for_kind(&own, InsuranceKind::Health, as_of);
            let pension = pick_effective_for_kind(&own, InsuranceKind::Pension, as_of);

            SnapshotRow {
                employee_code: employee.employee_code.clone(),
                name: employee.name.clone(),
                as_of,
                health_grade: health.map(|entry| entry.grade),
                health_standard_monthly: health.map(|entry| entry.standard_monthly_reward),
                health_applied_from: health.map(|entry| entry.applied_from),
                pension_grade: pension.map(|entry| entry.grade),
                pension_standard_monthly: pension.map(|entry| entry.standard_monthly_reward),
                pension_applied_from: pension.map(|entry| entry.applied_from),
            }
        })
        .collect()
}

/// Column order of [`SnapshotRow`], written even when there are no rows.
pub const SNAPSHOT_HEADERS: [&str; 9] = [
    "employee_code",
    "name",
    "as_of",
    "health_grade",
    "health_standard_monthly",
    "health_applied_from",
    "pension_grade",
    "pension_standard_monthly",
    "pension_applied_from",
];

pub fn write_snapshot<W: Write>(writer: W, rows: &[SnapshotRow]) -> Result<(), ExportError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(SNAPSHOT_HEADERS)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn snapshot_csv(rows: &[SnapshotRow]) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_snapshot(&mut buffer, rows)?;
    String::from_utf8(buffer).map_err(|err| ExportError::Encoding(err.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write snapshot CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush snapshot CSV: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot CSV is not valid UTF-8: {0}")]
    Encoding(String),
}
