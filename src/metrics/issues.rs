use chrono::{DateTime, Duration, Utc};

use crate::date_util::{round2, seconds_to_man_days};
use crate::error::Result;
use crate::metrics::triage::ProjectNames;
use crate::metrics::types::{ActivityPeriod, ActivityRow, IssueAnalyticsRow, Report};
use crate::model::{Issue, IssueState, Scope};
use crate::query::builder::IssueQuery;
use crate::source::IssueSource;

/// Effort in man-days: the larger of estimate and time spent.
pub fn effort_man_days(issue: &Issue) -> f64 {
    let ts = issue.time_stats;
    round2(seconds_to_man_days(ts.estimate_seconds.max(ts.spent_seconds)))
}

/// One row per issue of `scope` matching `query`.
pub async fn issue_analytics<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    query: &IssueQuery,
) -> Result<Report<Vec<IssueAnalyticsRow>>> {
    let issues = source.list_issues(Some(scope), query).await?;
    if issues.is_empty() {
        return Ok(Report::no_data("No issues found."));
    }
    log::info!("Building analytics for {} issues in {scope}", issues.len());

    let mut names = ProjectNames::default();
    let mut rows = Vec::with_capacity(issues.len());
    for issue in &issues {
        rows.push(IssueAnalyticsRow {
            iid: issue.iid,
            issue_type: issue.scoped_value("type").unwrap_or("NA").to_string(),
            title: issue.title.clone(),
            state: issue.state.as_str().to_string(),
            web_url: issue.web_url.clone(),
            project: names.get(source, issue.project_id).await,
            created: issue.created_at.date_naive(),
            updated: issue.updated_at.date_naive(),
            closed: issue.closed_at.map(|t| t.date_naive()),
            due_date: issue.due_date,
            labels: issue.labels.clone(),
            milestone: issue.milestone.as_ref().map(|m| m.title.clone()),
            assignees: issue.assignees.iter().map(|a| a.name.clone()).collect(),
            author: issue.author.name.clone(),
            effort_man_days: effort_man_days(issue),
            weight: issue.weight,
        });
    }
    Ok(Report::Ready(rows))
}

/// Issues assigned to `username` across the instance, either still open or
/// touched in the seven days before `now`.
pub async fn user_activity<S: IssueSource + ?Sized>(
    source: &S,
    username: &str,
    period: ActivityPeriod,
    now: DateTime<Utc>,
) -> Result<Report<Vec<ActivityRow>>> {
    let query = IssueQuery::new().assignee(username);
    let query = match period {
        ActivityPeriod::Current => query.state(IssueState::Opened),
        ActivityPeriod::LastWeek => query.updated_after(now - Duration::days(7)),
    };
    let issues = source.list_issues(None, &query).await?;
    if issues.is_empty() {
        return Ok(Report::no_data(
            "No issues found for this user in the specified period.",
        ));
    }

    Ok(Report::Ready(
        issues
            .iter()
            .map(|issue| ActivityRow {
                iid: issue.iid,
                title: issue.title.clone(),
                workflow: issue.scoped_value("workflow").unwrap_or("NA").to_string(),
                issue_type: issue.scoped_value("type").unwrap_or("other").to_string(),
                created: issue.created_at.date_naive(),
                updated: issue.updated_at.date_naive(),
                estimate_man_days: round2(seconds_to_man_days(issue.time_stats.estimate_seconds)),
                web_url: issue.web_url.clone(),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::TimeStats;
    use crate::source::fixtures::*;
    use crate::source::{MemorySource, Snapshot};

    #[test]
    fn test_effort_takes_larger_value() {
        let mut i = issue(1, "2024-01-01T00:00:00Z", &[]);
        i.time_stats = TimeStats {
            estimate_seconds: 4 * 3600,
            spent_seconds: 20 * 3600,
        };
        assert_eq!(effort_man_days(&i), 2.5);
        i.time_stats = TimeStats::default();
        assert_eq!(effort_man_days(&i), 0.0);
    }

    #[tokio::test]
    async fn test_analytics_rows() {
        let mut a = issue(1, "2024-01-05T10:00:00Z", &["type::bug", "frontend"]);
        a.assignees = vec![user("Ana"), user("Bo")];
        a.time_stats.estimate_seconds = 8 * 3600;
        let mut b = issue(2, "2024-01-06T10:00:00Z", &[]);
        b.project_id = 11;
        let mut project_names = BTreeMap::new();
        project_names.insert(10, "Acme / Shop".to_string());
        let source = MemorySource::new(Snapshot {
            issues: vec![a, b],
            project_names,
            ..Snapshot::default()
        });

        let rows = issue_analytics(&source, &Scope::group("g"), &IssueQuery::new())
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(rows[0].issue_type, "bug");
        assert_eq!(rows[0].project, "Acme / Shop");
        assert_eq!(rows[0].assignees, vec!["Ana", "Bo"]);
        assert_eq!(rows[0].effort_man_days, 1.0);
        assert_eq!(rows[1].issue_type, "NA");
        assert_eq!(rows[1].project, "Unknown");
    }

    #[tokio::test]
    async fn test_analytics_no_data() {
        let source = MemorySource::default();
        let report = issue_analytics(&source, &Scope::group("g"), &IssueQuery::new().label("x"))
            .await
            .unwrap();
        assert_eq!(report.message(), Some("No issues found."));
    }

    fn activity_source() -> MemorySource {
        let mut open = issue(1, "2024-03-01T00:00:00Z", &["workflow::review"]);
        open.assignees = vec![user("Ana")];
        open.updated_at = ts("2024-03-02T00:00:00Z");
        let mut recent = closed(issue(2, "2024-03-01T00:00:00Z", &["type::bug"]), "2024-03-12T00:00:00Z");
        recent.assignees = vec![user("Ana")];
        let mut other = issue(3, "2024-03-01T00:00:00Z", &[]);
        other.assignees = vec![user("Bo")];
        MemorySource::new(Snapshot {
            issues: vec![open, recent, other],
            ..Snapshot::default()
        })
    }

    #[tokio::test]
    async fn test_activity_current() {
        let rows = user_activity(&activity_source(), "ana", ActivityPeriod::Current, ts("2024-03-14T00:00:00Z"))
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].workflow, "review");
        assert_eq!(rows[0].issue_type, "other");
    }

    #[tokio::test]
    async fn test_activity_last_week() {
        let rows = user_activity(&activity_source(), "ana", ActivityPeriod::LastWeek, ts("2024-03-14T00:00:00Z"))
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].iid, 2);
        assert_eq!(rows[0].workflow, "NA");
        assert_eq!(rows[0].issue_type, "bug");
    }

    #[tokio::test]
    async fn test_activity_no_data() {
        let report = user_activity(&activity_source(), "cy", ActivityPeriod::Current, ts("2024-03-14T00:00:00Z"))
            .await
            .unwrap();
        assert_eq!(
            report.message(),
            Some("No issues found for this user in the specified period.")
        );
    }
}
