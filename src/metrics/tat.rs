use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::date_util::{iso_week_key, iso_week_label, DAY_SECONDS};
use crate::error::Result;
use crate::metrics::types::{Report, TatPoint};
use crate::model::{Issue, IssueState, Scope};
use crate::query::builder::IssueQuery;
use crate::query::window::{trailing_months, DateWindow};
use crate::source::IssueSource;

/// Weekly mean turnaround time of `issues` closed inside `window`, bucketed
/// by the ISO week of creation. Weeks without issues are omitted.
pub fn tat_by_week(issues: &[Issue], window: &DateWindow) -> Vec<TatPoint> {
    let mut buckets: BTreeMap<(i32, u32), (f64, u64)> = BTreeMap::new();
    for issue in issues {
        let Some(closed_at) = issue.closed_at else {
            continue;
        };
        if !window.contains(closed_at) {
            continue;
        }
        let tat_days = (closed_at - issue.created_at).num_seconds() as f64 / DAY_SECONDS;
        let bucket = buckets.entry(iso_week_key(issue.created_at)).or_default();
        bucket.0 += tat_days;
        bucket.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(key, (sum, n))| TatPoint {
            week: iso_week_label(key),
            mean_tat_days: sum / n as f64,
            issue_count: n,
        })
        .collect()
}

/// Turnaround-time trend for issues closed in the last `months_back` months.
pub async fn compute_tat_trend<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    months_back: u32,
    today: NaiveDate,
) -> Result<Report<Vec<TatPoint>>> {
    let window = trailing_months(today, months_back);
    log::info!("Computing TAT trend for {scope} over {window}");

    // Closing an issue updates it, so this bound never drops an issue
    // closed inside the window.
    let query = IssueQuery::new()
        .state(IssueState::Closed)
        .updated_after(window.start);
    let issues = source.list_issues(Some(scope), &query).await?;

    let points = tat_by_week(&issues, &window);
    if points.is_empty() {
        return Ok(Report::no_data("No closed issues found in this period."));
    }
    Ok(Report::Ready(points))
}
