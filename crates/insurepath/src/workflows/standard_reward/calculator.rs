use serde::Serialize;

use super::bands::resolve_band;
use super::domain::{format_yen, InsuranceKind, Office, RateTable, YearMonth, Yen};
use super::selector::select_table;

/// Why one insurance kind could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no {} rate table is registered for {month}", .kind.label())]
    NoTableForMonth {
        kind: InsuranceKind,
        month: YearMonth,
    },
    #[error(
        "the {} band table effective from {effective_from} has no bands populated",
        .kind.label()
    )]
    EmptyBandTable {
        kind: InsuranceKind,
        effective_from: YearMonth,
    },
    #[error(
        "salary {} is outside the {} band range",
        format_yen(.salary.to_owned()),
        .kind.label()
    )]
    SalaryOutOfRange { kind: InsuranceKind, salary: Yen },
}

impl Serialize for ResolutionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<ResolutionError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pension: Option<ResolutionError>,
}

impl ResolutionErrors {
    pub fn is_empty(&self) -> bool {
        self.health.is_none() && self.pension.is_none()
    }
}

/// Health and pension grades for one salary and decision month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StandardRewardResult {
    pub health_grade: Option<u16>,
    pub health_standard_monthly: Option<Yen>,
    pub pension_grade: Option<u16>,
    pub pension_standard_monthly: Option<Yen>,
    pub errors: ResolutionErrors,
}

impl StandardRewardResult {
    pub fn health_resolved(&self) -> bool {
        self.health_grade.is_some() && self.health_standard_monthly.is_some()
    }

    pub fn pension_resolved(&self) -> bool {
        self.pension_grade.is_some() && self.pension_standard_monthly.is_some()
    }

    /// Whether the result may be committed to history: at least one kind resolved and no
    /// kind reported an error.
    pub fn can_commit(&self) -> bool {
        (self.health_resolved() || self.pension_resolved()) && self.errors.is_empty()
    }

    /// Resolved `(grade, standard monthly)` for a kind, if any.
    pub fn resolved(&self, kind: InsuranceKind) -> Option<(u16, Yen)> {
        match kind {
            InsuranceKind::Health => self.health_grade.zip(self.health_standard_monthly),
            InsuranceKind::Pension => self.pension_grade.zip(self.pension_standard_monthly),
            InsuranceKind::Care => None,
        }
    }
}

/// Resolves health and pension grades independently against the supplied table snapshot.
///
/// A non-positive salary or a missing decision month means there is nothing to compute yet
/// and yields an empty result without errors.
pub fn calculate(
    office: &Office,
    salary: Yen,
    decision_month: Option<YearMonth>,
    tables: &[RateTable],
) -> StandardRewardResult {
    let month = match decision_month {
        Some(month) if salary > 0 => month,
        _ => return StandardRewardResult::default(),
    };

    let mut result = StandardRewardResult::default();

    match resolve_kind(office, InsuranceKind::Health, salary, month, tables) {
        Ok((grade, standard)) => {
            result.health_grade = Some(grade);
            result.health_standard_monthly = Some(standard);
        }
        Err(error) => result.errors.health = Some(error),
    }

    match resolve_kind(office, InsuranceKind::Pension, salary, month, tables) {
        Ok((grade, standard)) => {
            result.pension_grade = Some(grade);
            result.pension_standard_monthly = Some(standard);
        }
        Err(error) => result.errors.pension = Some(error),
    }

    result
}

fn resolve_kind(
    office: &Office,
    kind: InsuranceKind,
    salary: Yen,
    month: YearMonth,
    tables: &[RateTable],
) -> Result<(u16, Yen), ResolutionError> {
    let table = select_table(office, kind, month, tables)
        .ok_or(ResolutionError::NoTableForMonth { kind, month })?;

    if table.bands.is_empty() {
        return Err(ResolutionError::EmptyBandTable {
            kind,
            effective_from: table.effective_from,
        });
    }

    resolve_band(salary, &table.bands)
        .map(|resolution| (resolution.grade, resolution.standard_monthly))
        .ok_or(ResolutionError::SalaryOutOfRange { kind, salary })
}
