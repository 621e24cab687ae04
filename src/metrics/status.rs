use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::date_util::{
    iso_week_key, iso_week_label, round2, seconds_to_days, seconds_to_man_days, spreadsheet_serial,
};
use crate::error::Result;
use crate::metrics::types::{IssueStageRow, Report, StageInterval, StageSeries, TimeInStatus};
use crate::model::{EventAction, Issue, LabelEvent, Scope};
use crate::query::builder::IssueQuery;
use crate::query::window::DateWindow;
use crate::source::IssueSource;

pub const NO_MAPPED_ISSUES: &str = "No issues found carrying the mapped stage labels.";
pub const NO_TRANSITIONS: &str = "No completed label transitions found for the mapped stages.";

/// Invert a stage → labels map into label → stage. A label listed under
/// several stages belongs to the last one in stage order.
pub fn reverse_stage_map(stages: &BTreeMap<String, Vec<String>>) -> HashMap<String, String> {
    let mut by_label = HashMap::new();
    for (stage, labels) in stages {
        for label in labels {
            by_label.insert(label.clone(), stage.clone());
        }
    }
    by_label
}

/// Rebuild closed label intervals from an issue's label events.
///
/// Events are replayed in timestamp order. An `add` opens an interval for
/// its label, replacing any interval already open for it; a `remove` closes
/// the open interval. Labels outside `stage_of` are ignored, and intervals
/// still open at the end contribute nothing.
pub fn replay(events: &[LabelEvent], stage_of: &HashMap<String, String>) -> Vec<StageInterval> {
    let mut ordered: Vec<&LabelEvent> = events
        .iter()
        .filter(|e| stage_of.contains_key(&e.label))
        .collect();
    ordered.sort_by_key(|e| e.created_at);

    let mut open = HashMap::new();
    let mut intervals = Vec::new();
    for event in ordered {
        match event.action {
            EventAction::Add => {
                open.insert(event.label.as_str(), event.created_at);
            }
            EventAction::Remove => {
                let Some(started) = open.remove(event.label.as_str()) else {
                    continue;
                };
                intervals.push(StageInterval {
                    label: event.label.clone(),
                    stage: stage_of[&event.label].clone(),
                    seconds: (event.created_at - started).num_seconds(),
                    ended_at: event.created_at,
                });
            }
        }
    }
    intervals
}

/// Fold per-issue intervals into the weekly chart and the per-issue table.
/// Issues without intervals are left out of the table.
pub fn summarize(
    per_issue: &[(Issue, Vec<StageInterval>)],
    stages: &BTreeMap<String, Vec<String>>,
) -> Report<TimeInStatus> {
    let mut weekly: BTreeMap<(i32, u32), HashMap<&str, i64>> = BTreeMap::new();
    let mut rows = Vec::new();

    for (issue, intervals) in per_issue {
        if intervals.is_empty() {
            continue;
        }
        let mut per_stage: BTreeMap<String, i64> =
            stages.keys().map(|s| (s.clone(), 0)).collect();
        for interval in intervals {
            *per_stage.entry(interval.stage.clone()).or_default() += interval.seconds;
            *weekly
                .entry(iso_week_key(interval.ended_at))
                .or_default()
                .entry(interval.stage.as_str())
                .or_default() += interval.seconds;
        }
        let total: i64 = per_stage.values().sum();
        rows.push(IssueStageRow {
            iid: issue.iid,
            title: issue.title.clone(),
            web_url: issue.web_url.clone(),
            created_serial: spreadsheet_serial(issue.created_at.date_naive()),
            stage_man_days: per_stage
                .into_iter()
                .map(|(stage, secs)| (stage, round2(seconds_to_man_days(secs))))
                .collect(),
            total_man_days: round2(seconds_to_man_days(total)),
        });
    }

    if rows.is_empty() {
        return Report::no_data(NO_TRANSITIONS);
    }

    let weeks: Vec<String> = weekly.keys().map(|k| iso_week_label(*k)).collect();
    let series = stages
        .keys()
        .map(|stage| StageSeries {
            stage: stage.clone(),
            values: weekly
                .values()
                .map(|by_stage| {
                    round2(seconds_to_days(by_stage.get(stage.as_str()).copied().unwrap_or(0)))
                })
                .collect(),
        })
        .collect();

    Report::Ready(TimeInStatus {
        weeks,
        series,
        issues: rows,
    })
}

/// Time spent in each workflow stage by issues of `scope`, counting label
/// intervals that ended inside `window`.
pub async fn compute_time_in_status<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    window: &DateWindow,
    stages: &BTreeMap<String, Vec<String>>,
) -> Result<Report<TimeInStatus>> {
    let stage_of = reverse_stage_map(stages);
    log::info!(
        "Computing time in status for {scope} over {window} ({} stages, {} labels)",
        stages.len(),
        stage_of.len()
    );

    // An interval ending in the window means the issue was updated in it.
    let query = IssueQuery::new().updated_after(window.start);
    let issues: Vec<Issue> = source
        .list_issues(Some(scope), &query)
        .await?
        .into_iter()
        .filter(|i| i.labels.iter().any(|l| stage_of.contains_key(l)))
        .collect();
    if issues.is_empty() {
        return Ok(Report::no_data(NO_MAPPED_ISSUES));
    }

    let mut per_issue = Vec::with_capacity(issues.len());
    let mut seen_labels = BTreeSet::new();
    for issue in issues {
        let events = source.list_label_events(issue.issue_ref()).await?;
        let intervals: Vec<StageInterval> = replay(&events, &stage_of)
            .into_iter()
            .filter(|iv| window.contains(iv.ended_at))
            .collect();
        seen_labels.extend(intervals.iter().map(|iv| iv.label.clone()));
        per_issue.push((issue, intervals));
    }
    log::debug!("labels with closed intervals: {seen_labels:?}");

    Ok(summarize(&per_issue, stages))
}
