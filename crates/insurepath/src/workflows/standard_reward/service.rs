use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::bands::{validate_bands, validate_rate, BandTableError};
use super::calculator::{calculate, StandardRewardResult};
use super::domain::{
    CloudRateTable, DecisionKind, Employee, EmployeeId, HealthPlan, HistoryId, InsuranceKind,
    Office, OfficeId, RateTable, RateTableDraft, RateTableId, StandardRewardHistory, YearMonth,
    Yen,
};
use super::export::{snapshot_csv, snapshot_rows, ExportError};
use super::history::pick_effective_for_kind;
use super::repository::{
    HistoryRepository, OfficeRepository, RateTableRepository, RepositoryError, TableWrite,
};
use super::session::{ProfileDirectory, SessionContext, SessionError};

static TABLE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static HISTORY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_table_id() -> RateTableId {
    let id = TABLE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RateTableId(format!("rt-{id:06}"))
}

fn next_history_id() -> HistoryId {
    let id = HISTORY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    HistoryId(format!("srh-{id:06}"))
}

/// Request to accept a calculated standard reward into an employee's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub salary: Yen,
    pub decision_month: YearMonth,
    pub decision_kind: DecisionKind,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub result: StandardRewardResult,
    pub entries: Vec<StandardRewardHistory>,
}

/// Entries in force for one employee as of a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveRewards {
    pub as_of: YearMonth,
    pub health: Option<StandardRewardHistory>,
    pub pension: Option<StandardRewardHistory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub table: RateTable,
    pub replaced: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedOutcome {
    pub created: usize,
    pub overwritten: usize,
    pub skipped: usize,
}

/// Service composing the repositories with the standard reward engine.
pub struct StandardRewardService<T, H> {
    tables: Arc<T>,
    histories: Arc<H>,
    profiles: Arc<dyn ProfileDirectory>,
}

impl<T, H> StandardRewardService<T, H>
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    pub fn new(tables: Arc<T>, histories: Arc<H>, profiles: Arc<dyn ProfileDirectory>) -> Self {
        Self {
            tables,
            histories,
            profiles,
        }
    }

    /// Resolve the caller's profile from request headers.
    pub fn session(&self, headers: &HeaderMap) -> Result<SessionContext, SessionError> {
        SessionContext::from_headers(headers, self.profiles.as_ref())
    }

    pub fn office(&self, office_id: &OfficeId) -> Result<Office, StandardRewardServiceError> {
        self.tables
            .fetch_office(office_id)?
            .ok_or_else(|| StandardRewardServiceError::OfficeNotFound(office_id.clone()))
    }

    pub fn upsert_office(
        &self,
        session: &SessionContext,
        office: Office,
    ) -> Result<Office, StandardRewardServiceError> {
        session.require_edit(&office.id)?;
        self.tables.upsert_office(office.clone())?;
        info!(office = %office.id, "office saved");
        Ok(office)
    }

    pub fn upsert_employee(
        &self,
        session: &SessionContext,
        employee: Employee,
    ) -> Result<Employee, StandardRewardServiceError> {
        session.require_edit(&employee.office_id)?;
        self.office(&employee.office_id)?;
        self.histories.upsert_employee(employee.clone())?;
        Ok(employee)
    }

    /// Run the calculator for an office against its current table snapshot.
    pub fn calculate(
        &self,
        office_id: &OfficeId,
        salary: Yen,
        decision_month: Option<YearMonth>,
    ) -> Result<StandardRewardResult, StandardRewardServiceError> {
        let office = self.office(office_id)?;
        let mut tables = self
            .tables
            .tables_for_office(office_id, InsuranceKind::Health)?;
        tables.extend(
            self.tables
                .tables_for_office(office_id, InsuranceKind::Pension)?,
        );

        let result = calculate(&office, salary, decision_month, &tables);
        debug!(
            office = %office_id,
            salary,
            health_grade = ?result.health_grade,
            pension_grade = ?result.pension_grade,
            "standard reward calculated"
        );
        Ok(result)
    }

    /// Recompute and append one history entry per resolved kind.
    ///
    /// Blocked unless at least one kind resolved and neither kind reported an error.
    pub fn commit(
        &self,
        session: &SessionContext,
        office_id: &OfficeId,
        employee_id: &EmployeeId,
        request: CommitRequest,
    ) -> Result<CommitOutcome, StandardRewardServiceError> {
        session.require_edit(office_id)?;
        self.employee_in_office(office_id, employee_id)?;

        let result = self.calculate(office_id, request.salary, Some(request.decision_month))?;
        if !result.can_commit() {
            warn!(
                office = %office_id,
                employee = %employee_id,
                month = %request.decision_month,
                "standard reward commit blocked"
            );
            return Err(StandardRewardServiceError::CommitBlocked(Box::new(result)));
        }

        let mut entries = Vec::new();
        for kind in [InsuranceKind::Health, InsuranceKind::Pension] {
            let Some((grade, standard_monthly_reward)) = result.resolved(kind) else {
                continue;
            };
            let entry = StandardRewardHistory {
                id: next_history_id(),
                employee_id: employee_id.clone(),
                office_id: office_id.clone(),
                kind,
                applied_from: request.decision_month,
                grade,
                standard_monthly_reward,
                decision_kind: request.decision_kind,
                note: request.note.clone(),
                created_at: Utc::now(),
            };
            entries.push(self.histories.append_history(entry)?);
        }

        info!(
            office = %office_id,
            employee = %employee_id,
            month = %request.decision_month,
            entries = entries.len(),
            "standard reward committed"
        );
        Ok(CommitOutcome { result, entries })
    }

    pub fn effective_rewards(
        &self,
        office_id: &OfficeId,
        employee_id: &EmployeeId,
        as_of: YearMonth,
    ) -> Result<EffectiveRewards, StandardRewardServiceError> {
        self.employee_in_office(office_id, employee_id)?;
        let histories = self.histories.histories_for_employee(employee_id)?;

        Ok(EffectiveRewards {
            as_of,
            health: pick_effective_for_kind(&histories, InsuranceKind::Health, as_of).cloned(),
            pension: pick_effective_for_kind(&histories, InsuranceKind::Pension, as_of).cloned(),
        })
    }

    /// Office tables of one kind, newest effective month first.
    pub fn rate_tables(
        &self,
        office_id: &OfficeId,
        kind: InsuranceKind,
    ) -> Result<Vec<RateTable>, StandardRewardServiceError> {
        self.office(office_id)?;
        let mut tables = self.tables.tables_for_office(office_id, kind)?;
        tables.sort_by(|left, right| {
            right
                .effective_from
                .cmp(&left.effective_from)
                .then_with(|| right.updated_at.cmp(&left.updated_at))
        });
        Ok(tables)
    }

    /// Validate and store a table, refusing to shadow an existing table for the same month
    /// and plan unless `overwrite` is set.
    pub fn save_rate_table(
        &self,
        session: &SessionContext,
        office_id: &OfficeId,
        draft: RateTableDraft,
        overwrite: bool,
    ) -> Result<SaveOutcome, StandardRewardServiceError> {
        session.require_edit(office_id)?;
        let office = self.office(office_id)?;
        validate_draft(&office, &draft)?;
        self.store_draft(office_id, draft, overwrite)
    }

    /// Validate every draft, and reject a batch naming the same partition twice, before
    /// storing any of them. Outcomes follow draft order.
    pub fn save_rate_tables(
        &self,
        session: &SessionContext,
        office_id: &OfficeId,
        drafts: Vec<RateTableDraft>,
        overwrite: bool,
    ) -> Result<Vec<SaveOutcome>, StandardRewardServiceError> {
        session.require_edit(office_id)?;
        let office = self.office(office_id)?;

        for (index, draft) in drafts.iter().enumerate() {
            validate_draft(&office, draft)?;
            if drafts[..index]
                .iter()
                .any(|earlier| same_draft_partition(earlier, draft))
            {
                return Err(StandardRewardServiceError::InvalidDraft(format!(
                    "{} table effective from {} appears more than once",
                    draft.kind, draft.effective_from
                )));
            }
        }

        drafts
            .into_iter()
            .map(|draft| self.store_draft(office_id, draft, overwrite))
            .collect()
    }

    /// Copy the cloud presets for `year` into the office's tables.
    pub fn seed_from_cloud(
        &self,
        session: &SessionContext,
        office_id: &OfficeId,
        kind: InsuranceKind,
        year: u16,
        overwrite: bool,
    ) -> Result<SeedOutcome, StandardRewardServiceError> {
        session.require_edit(office_id)?;
        let office = self.office(office_id)?;

        let pref_code = if kind.is_plan_scoped() {
            match &office.health_plan {
                Some(HealthPlan::Kyokai { pref_code }) => Some(pref_code.clone()),
                _ => {
                    return Err(StandardRewardServiceError::InvalidDraft(
                        "cloud health presets cover kyokai offices only".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        let mut outcome = SeedOutcome::default();
        for preset in self.tables.cloud_tables(kind, year)? {
            if preset.pref_code != pref_code {
                continue;
            }

            let plan = pref_code.clone().map(|pref_code| HealthPlan::Kyokai { pref_code });
            let draft = RateTableDraft {
                kind,
                plan,
                effective_from: preset.effective_from,
                rate: preset.rate,
                bands: preset.bands,
            };
            validate_draft(&office, &draft)?;

            match self.store_draft(office_id, draft, overwrite) {
                Ok(SaveOutcome { replaced: true, .. }) => outcome.overwritten += 1,
                Ok(SaveOutcome { replaced: false, .. }) => outcome.created += 1,
                Err(StandardRewardServiceError::DuplicateTable { .. }) => outcome.skipped += 1,
                Err(other) => return Err(other),
            }
        }

        info!(
            office = %office_id,
            %kind,
            year,
            created = outcome.created,
            overwritten = outcome.overwritten,
            skipped = outcome.skipped,
            "rate tables seeded from cloud presets"
        );
        Ok(outcome)
    }

    /// Publish a shared preset. Platform administrators only.
    pub fn publish_cloud_table(
        &self,
        session: &SessionContext,
        table: CloudRateTable,
    ) -> Result<CloudRateTable, StandardRewardServiceError> {
        session.require_admin()?;
        match (table.kind.is_plan_scoped(), &table.pref_code) {
            (true, None) => {
                return Err(StandardRewardServiceError::InvalidDraft(
                    "cloud health presets must name a prefecture".to_string(),
                ))
            }
            (false, Some(pref_code)) => {
                return Err(StandardRewardServiceError::InvalidDraft(format!(
                    "{} presets are nationwide and cannot carry prefecture '{}'",
                    table.kind, pref_code
                )))
            }
            _ => {}
        }
        validate_rate(table.rate)?;
        validate_bands(&table.bands)?;
        if table.effective_from.year() != table.year {
            return Err(StandardRewardServiceError::InvalidDraft(format!(
                "preset for {} cannot take effect in {}",
                table.year, table.effective_from
            )));
        }
        self.tables.save_cloud_table(table.clone())?;
        Ok(table)
    }

    /// CSV snapshot of every employee's standard reward as of a month.
    pub fn export_snapshot(
        &self,
        office_id: &OfficeId,
        as_of: YearMonth,
    ) -> Result<String, StandardRewardServiceError> {
        self.office(office_id)?;
        let employees = self.histories.employees_for_office(office_id)?;
        let mut histories = Vec::new();
        for employee in &employees {
            histories.extend(self.histories.histories_for_employee(&employee.id)?);
        }

        let rows = snapshot_rows(&employees, &histories, as_of);
        Ok(snapshot_csv(&rows)?)
    }

    fn employee_in_office(
        &self,
        office_id: &OfficeId,
        employee_id: &EmployeeId,
    ) -> Result<Employee, StandardRewardServiceError> {
        self.histories
            .fetch_employee(employee_id)?
            .filter(|employee| &employee.office_id == office_id)
            .ok_or_else(|| StandardRewardServiceError::EmployeeNotFound(employee_id.clone()))
    }

    fn store_draft(
        &self,
        office_id: &OfficeId,
        draft: RateTableDraft,
        overwrite: bool,
    ) -> Result<SaveOutcome, StandardRewardServiceError> {
        let kind = draft.kind;
        let effective_from = draft.effective_from;
        let now = Utc::now();
        let table = RateTable {
            id: next_table_id(),
            office_id: office_id.clone(),
            kind,
            plan: draft.plan,
            effective_from,
            rate: draft.rate,
            bands: draft.bands,
            created_at: now,
            updated_at: now,
        };

        let (table, replaced) = match self.tables.save_table(table, overwrite)? {
            TableWrite::Created(table) => (table, false),
            TableWrite::Replaced(table) => (table, true),
            TableWrite::Duplicate(existing_id) => {
                return Err(StandardRewardServiceError::DuplicateTable {
                    kind,
                    effective_from,
                    existing_id,
                });
            }
        };

        info!(
            office = %office_id,
            table = %table.id,
            kind = %table.kind,
            effective_from = %table.effective_from,
            replaced,
            "rate table saved"
        );
        Ok(SaveOutcome { table, replaced })
    }
}

fn validate_draft(office: &Office, draft: &RateTableDraft) -> Result<(), StandardRewardServiceError> {
    validate_rate(draft.rate)?;

    if draft.kind.is_plan_scoped() {
        let plan = draft.plan.as_ref().ok_or_else(|| {
            StandardRewardServiceError::InvalidDraft(
                "health tables must name a kyokai prefecture or kumiai plan".to_string(),
            )
        })?;
        if let Some(office_plan) = &office.health_plan {
            if !office_plan.selects(plan) {
                warn!(
                    office = %office.id,
                    office_plan = office_plan.plan_type(),
                    table_plan = plan.plan_type(),
                    "saving a health table the office plan will not select"
                );
            }
        }
    } else if draft.plan.is_some() {
        return Err(StandardRewardServiceError::InvalidDraft(format!(
            "{} tables are not partitioned by health plan",
            draft.kind
        )));
    }

    if !draft.kind.has_bands() && !draft.bands.is_empty() {
        return Err(StandardRewardServiceError::InvalidDraft(format!(
            "{} tables carry a rate only",
            draft.kind
        )));
    }

    validate_bands(&draft.bands)?;
    Ok(())
}

fn same_draft_partition(left: &RateTableDraft, right: &RateTableDraft) -> bool {
    left.kind == right.kind
        && left.effective_from == right.effective_from
        && match (&left.plan, &right.plan) {
            (Some(left), Some(right)) => left.same_partition(right),
            (None, None) => true,
            _ => false,
        }
}

fn blocked_reason(result: &StandardRewardResult) -> String {
    let reasons: Vec<String> = [&result.errors.health, &result.errors.pension]
        .into_iter()
        .flatten()
        .map(ToString::to_string)
        .collect();

    if reasons.is_empty() {
        "neither health nor pension could be resolved".to_string()
    } else {
        reasons.join("; ")
    }
}

/// Error raised by the standard reward service.
#[derive(Debug, thiserror::Error)]
pub enum StandardRewardServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("office '{0}' is not registered")]
    OfficeNotFound(OfficeId),
    #[error("employee '{0}' is not registered for this office")]
    EmployeeNotFound(EmployeeId),
    #[error(
        "a {kind} rate table effective from {effective_from} already exists ({existing_id}); \
         confirm overwrite to replace it"
    )]
    DuplicateTable {
        kind: InsuranceKind,
        effective_from: YearMonth,
        existing_id: RateTableId,
    },
    #[error("invalid band table: {0}")]
    InvalidBands(#[from] BandTableError),
    #[error("invalid rate table: {0}")]
    InvalidDraft(String),
    #[error("standard reward cannot be committed: {}", blocked_reason(.0))]
    CommitBlocked(Box<StandardRewardResult>),
    #[error(transparent)]
    Export(#[from] ExportError),
}
