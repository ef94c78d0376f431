use super::domain::{InsuranceKind, StandardRewardHistory, YearMonth};

/// Picks the history entry to report as of `as_of`.
///
/// The latest entry applied on or before `as_of` wins. When every entry lies in the future
/// the earliest upcoming one is returned instead, so a snapshot still shows the decision
/// the employee is about to move onto. Only an empty list yields `None`. Entries sharing an
/// `applied_from` month resolve to the one appearing last in the input.
pub fn pick_effective(
    histories: &[StandardRewardHistory],
    as_of: YearMonth,
) -> Option<&StandardRewardHistory> {
    pick_from(histories.iter(), as_of)
}

/// [`pick_effective`] restricted to one insurance kind.
pub fn pick_effective_for_kind(
    histories: &[StandardRewardHistory],
    kind: InsuranceKind,
    as_of: YearMonth,
) -> Option<&StandardRewardHistory> {
    pick_from(histories.iter().filter(|entry| entry.kind == kind), as_of)
}

fn pick_from<'a, I>(entries: I, as_of: YearMonth) -> Option<&'a StandardRewardHistory>
where
    I: Iterator<Item = &'a StandardRewardHistory> + Clone,
{
    let in_effect = entries
        .clone()
        .filter(|entry| entry.applied_from <= as_of)
        .max_by_key(|entry| entry.applied_from);

    // max_by keeps the last of equal elements; reversing the ordering yields the earliest
    // month with the same tie rule as above.
    in_effect.or_else(|| entries.max_by(|left, right| right.applied_from.cmp(&left.applied_from)))
}
