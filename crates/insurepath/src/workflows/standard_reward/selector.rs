use super::domain::{InsuranceKind, Office, RateTable, YearMonth};

/// Picks the table of `kind` in force for `office` at `target`.
///
/// Candidates must belong to the office and, for health, match its plan (kyokai by
/// prefecture, kumiai regardless of union code). Among candidates effective on or before
/// `target` the latest effective month wins. Equal months fall back to the most recently
/// updated table, then the greatest id, so the choice never depends on input order.
///
/// Returns `None` when nothing qualifies, including health lookups for an office with no
/// plan configured.
pub fn select_table<'a>(
    office: &Office,
    kind: InsuranceKind,
    target: YearMonth,
    tables: &'a [RateTable],
) -> Option<&'a RateTable> {
    let office_plan = if kind.is_plan_scoped() {
        Some(office.health_plan.as_ref()?)
    } else {
        None
    };

    tables
        .iter()
        .filter(|table| table.office_id == office.id && table.kind == kind)
        .filter(|table| match office_plan {
            Some(plan) => table
                .plan
                .as_ref()
                .is_some_and(|table_plan| plan.selects(table_plan)),
            None => true,
        })
        .filter(|table| table.effective_from <= target)
        .max_by(|left, right| {
            left.effective_from
                .cmp(&right.effective_from)
                .then_with(|| left.updated_at.cmp(&right.updated_at))
                .then_with(|| left.id.cmp(&right.id))
        })
}
