use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::date_util::start_of_day;
use crate::error::Result;
use crate::metrics::types::{Report, TriageLagRow};
use crate::model::{EventAction, Issue, Milestone, MilestoneEvent, Scope};
use crate::query::builder::{IssueQuery, MilestoneQuery, MilestoneState};
use crate::query::window::DateWindow;
use crate::source::IssueSource;

/// How many open future milestones may be appended to the window's own.
pub const UPCOMING_LIMIT: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct TriageLagOptions {
    /// Also report on the next few open milestones due after today.
    pub include_upcoming: bool,
    /// Keep only issues carrying at least one of these labels; empty keeps all.
    pub labels: Vec<String>,
}

/// Caches project display names for one report run. Lookup failures are
/// logged and shown as `Unknown`.
#[derive(Debug, Default)]
pub(crate) struct ProjectNames {
    cache: HashMap<u64, String>,
}

impl ProjectNames {
    pub(crate) async fn get<S: IssueSource + ?Sized>(&mut self, source: &S, project_id: u64) -> String {
        if let Some(name) = self.cache.get(&project_id) {
            return name.clone();
        }
        let name = match source.project_name(project_id).await {
            Ok(name) => name,
            Err(e) => {
                log::warn!("Could not resolve name of project {project_id}: {e}");
                "Unknown".to_string()
            }
        };
        self.cache.insert(project_id, name.clone());
        name
    }
}

/// Due-date order with undated milestones last; ties keep their order.
fn by_due_date(a: &Milestone, b: &Milestone) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Merge the window's milestones with up to [`UPCOMING_LIMIT`] upcoming
/// ones, dropping duplicates by id and sorting by due date.
pub fn merge_milestones(in_window: Vec<Milestone>, mut upcoming: Vec<Milestone>) -> Vec<Milestone> {
    upcoming.sort_by(by_due_date);
    let mut merged: BTreeMap<u64, Milestone> = BTreeMap::new();
    for m in in_window
        .into_iter()
        .chain(upcoming.into_iter().take(UPCOMING_LIMIT))
    {
        merged.entry(m.id).or_insert(m);
    }
    let mut list: Vec<Milestone> = merged.into_values().collect();
    list.sort_by(by_due_date);
    list
}

/// Earliest `add` of the issue to `milestone_id`.
pub fn first_assignment(events: &[MilestoneEvent], milestone_id: u64) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.milestone_id == milestone_id && e.action == EventAction::Add)
        .map(|e| e.created_at)
        .min()
}

/// Whole days from the assignment to the start of the due date, rounded
/// down. Assignments later than midnight UTC of the due date are negative.
pub fn lag_days(due: NaiveDate, assigned_at: DateTime<Utc>) -> i64 {
    (start_of_day(due) - assigned_at)
        .num_seconds()
        .div_euclid(86_400)
}

fn carries_any(issue: &Issue, labels: &[String]) -> bool {
    labels.is_empty() || issue.labels.iter().any(|l| labels.contains(l))
}

/// Lag between the first assignment of each issue to a milestone and that
/// milestone's due date, for milestones due in `window`.
///
/// Assignments made after the due date give a negative lag and are left out.
pub async fn compute_triage_lag<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    window: &DateWindow,
    options: &TriageLagOptions,
    today: NaiveDate,
) -> Result<Report<Vec<TriageLagRow>>> {
    log::info!("Computing triage lag for {scope} over {window}");

    let in_window = source
        .list_milestones(
            scope,
            &MilestoneQuery::new()
                .due_after(window.start_date())
                .due_before(window.last_date()),
        )
        .await?;
    let upcoming = if options.include_upcoming {
        source
            .list_milestones(
                scope,
                &MilestoneQuery::new()
                    .state(MilestoneState::Active)
                    .due_after(today + Duration::days(1)),
            )
            .await?
    } else {
        Vec::new()
    };
    let milestones = merge_milestones(in_window, upcoming);
    if milestones.is_empty() {
        return Ok(Report::no_data("No milestones found in this period."));
    }

    let mut names = ProjectNames::default();
    let mut rows = Vec::new();
    for milestone in &milestones {
        let Some(due) = milestone.due_date else {
            log::debug!("Milestone '{}' has no due date; skipped", milestone.title);
            continue;
        };
        let issues = source
            .list_issues(Some(scope), &IssueQuery::new().milestone(&milestone.title))
            .await?;
        for issue in issues.iter().filter(|i| carries_any(i, &options.labels)) {
            let events = source.list_milestone_events(issue.issue_ref()).await?;
            let Some(assigned_at) = first_assignment(&events, milestone.id) else {
                continue;
            };
            let lag = lag_days(due, assigned_at);
            if lag < 0 {
                log::debug!(
                    "{} assigned to '{}' {} days after its due date; dropped",
                    issue.issue_ref(),
                    milestone.title,
                    -lag
                );
                continue;
            }
            rows.push(TriageLagRow {
                project: names.get(source, issue.project_id).await,
                iid: issue.iid,
                title: issue.title.clone(),
                issue_type: issue.scoped_value("type").unwrap_or("NA").to_string(),
                web_url: issue.web_url.clone(),
                milestone: milestone.title.clone(),
                due_date: due,
                assigned_on: assigned_at.date_naive(),
                lag_days: lag,
            });
        }
    }

    if rows.is_empty() {
        return Ok(Report::no_data(
            "No milestone assignments found for the selected milestones.",
        ));
    }
    Ok(Report::Ready(rows))
}
