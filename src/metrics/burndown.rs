use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::metrics::types::Burndown;
use crate::model::Issue;

impl Burndown {
    /// Two-point chart used when the milestone has no usable date range.
    fn two_point(first: &str, last: &str, total: u64, open: u64) -> Self {
        Self {
            labels: vec![first.to_string(), last.to_string()],
            ideal: vec![total as f64, 0.0],
            actual: vec![total, open],
        }
    }
}

/// Burndown of a milestone's `issues` between `start` and `due`, both
/// inclusive.
///
/// The ideal line falls linearly from the issue count to zero; the actual
/// line subtracts issues as they close, day by day. Without both dates the
/// chart collapses to `Start`/`Current`, and a due date before the start
/// collapses it to `Start`/`End`.
pub fn burndown(issues: &[Issue], start: Option<NaiveDate>, due: Option<NaiveDate>) -> Burndown {
    let total = issues.len() as u64;
    let open = issues.iter().filter(|i| !i.is_closed()).count() as u64;

    let (Some(start), Some(due)) = (start, due) else {
        return Burndown::two_point("Start", "Current", total, open);
    };
    if due < start {
        log::warn!("Milestone due date {due} precedes start date {start}; using two-point burndown");
        return Burndown::two_point("Start", "End", total, open);
    }

    let total_days = (due - start).num_days();
    let rate = if total_days > 0 {
        total as f64 / total_days as f64
    } else {
        total as f64
    };

    let mut closed_per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for issue in issues.iter().filter(|i| i.is_closed()) {
        if let Some(closed_at) = issue.closed_at {
            *closed_per_day.entry(closed_at.date_naive()).or_default() += 1;
        }
    }

    let mut labels = Vec::with_capacity(total_days as usize + 1);
    let mut ideal = Vec::with_capacity(total_days as usize + 1);
    let mut actual = Vec::with_capacity(total_days as usize + 1);
    let mut closed_so_far = 0u64;
    for (i, day) in start.iter_days().take(total_days as usize + 1).enumerate() {
        labels.push(day.format("%Y-%m-%d").to_string());
        ideal.push((total as f64 - i as f64 * rate).max(0.0));
        closed_so_far += closed_per_day.get(&day).copied().unwrap_or(0);
        actual.push(total.saturating_sub(closed_so_far));
    }

    Burndown {
        labels,
        ideal,
        actual,
    }
}
