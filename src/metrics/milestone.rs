use crate::date_util::round2;
use crate::error::Result;
use crate::metrics::burndown::burndown;
use crate::metrics::types::{MilestoneDetail, MilestoneIssueRow, MilestoneSummary, Report};
use crate::model::Scope;
use crate::query::builder::{IssueQuery, MilestoneQuery};
use crate::query::window::DateWindow;
use crate::source::IssueSource;

/// Milestones of `group` due within `window`, with issue counts.
pub async fn list_milestones<S: IssueSource + ?Sized>(
    source: &S,
    group: &Scope,
    window: &DateWindow,
) -> Result<Report<Vec<MilestoneSummary>>> {
    let all = source.list_milestones(group, &MilestoneQuery::new()).await?;
    if all.is_empty() {
        return Ok(Report::no_data("No milestones found for this group."));
    }

    let in_window = MilestoneQuery::new()
        .due_after(window.start_date())
        .due_before(window.last_date());
    let mut summaries = Vec::new();
    for m in all.iter().filter(|m| in_window.matches(m)) {
        let issues = source
            .list_issues(Some(group), &IssueQuery::new().milestone(&m.title))
            .await?;
        summaries.push(MilestoneSummary {
            id: m.id,
            title: m.title.clone(),
            due_date: m.due_date,
            total_issues: issues.len() as u64,
            closed_issues: issues.iter().filter(|i| i.is_closed()).count() as u64,
        });
    }
    log::info!(
        "{} of {} milestones in {group} are due in {window}",
        summaries.len(),
        all.len()
    );
    Ok(Report::Ready(summaries))
}

/// Completion figures, issue list and burndown of one milestone.
pub async fn milestone_detail<S: IssueSource + ?Sized>(
    source: &S,
    group: &Scope,
    milestone_id: u64,
) -> Result<Report<MilestoneDetail>> {
    let Some(milestone) = source.get_milestone(group, milestone_id).await? else {
        return Ok(Report::no_data("Milestone not found."));
    };
    let issues = source
        .list_issues(Some(group), &IssueQuery::new().milestone(&milestone.title))
        .await?;

    let total = issues.len() as u64;
    let closed = issues.iter().filter(|i| i.is_closed()).count() as u64;
    let completion_pct = if total > 0 {
        round2(closed as f64 / total as f64 * 100.0)
    } else {
        0.0
    };

    Ok(Report::Ready(MilestoneDetail {
        id: milestone.id,
        title: milestone.title.clone(),
        start_date: milestone.start_date,
        due_date: milestone.due_date,
        total_issues: total,
        closed_issues: closed,
        open_issues: total - closed,
        completion_pct,
        issues: issues
            .iter()
            .map(|i| MilestoneIssueRow {
                iid: i.iid,
                title: i.title.clone(),
                state: i.state.as_str().to_string(),
                web_url: i.web_url.clone(),
            })
            .collect(),
        burndown: burndown(&issues, milestone.start_date, milestone.due_date),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::*;
    use crate::source::{MemorySource, Snapshot};

    fn snapshot() -> Snapshot {
        let mut sprint = milestone(1, "Sprint 1", Some("2024-03-15"), "active");
        sprint.start_date = Some(date("2024-03-01"));
        let later = milestone(2, "Sprint 2", Some("2024-04-15"), "active");
        let undated = milestone(3, "Backlog", None, "active");
        Snapshot {
            issues: vec![
                closed(in_milestone(issue(1, "2024-02-20T00:00:00Z", &[]), &sprint), "2024-03-04T10:00:00Z"),
                in_milestone(issue(2, "2024-02-20T00:00:00Z", &[]), &sprint),
                in_milestone(issue(3, "2024-02-20T00:00:00Z", &[]), &sprint),
                in_milestone(issue(4, "2024-02-20T00:00:00Z", &[]), &later),
            ],
            milestones: vec![sprint, later, undated],
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_due_date() {
        let source = MemorySource::new(snapshot());
        let window = DateWindow::days(date("2024-03-01"), date("2024-03-15"));
        let list = list_milestones(&source, &Scope::group("g"), &window)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Sprint 1");
        assert_eq!(list[0].total_issues, 3);
        assert_eq!(list[0].closed_issues, 1);
    }

    #[tokio::test]
    async fn test_list_empty_group() {
        let source = MemorySource::default();
        let window = DateWindow::days(date("2024-03-01"), date("2024-03-15"));
        let report = list_milestones(&source, &Scope::group("g"), &window).await.unwrap();
        assert_eq!(report.message(), Some("No milestones found for this group."));
    }

    #[tokio::test]
    async fn test_detail() {
        let source = MemorySource::new(snapshot());
        let detail = milestone_detail(&source, &Scope::group("g"), 1)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(detail.total_issues, 3);
        assert_eq!(detail.open_issues, 2);
        assert_eq!(detail.completion_pct, 33.33);
        assert_eq!(detail.issues[0].state, "closed");
        assert_eq!(detail.burndown.labels.len(), 15);
        assert_eq!(detail.burndown.actual[2], 3);
        assert_eq!(detail.burndown.actual[3], 2);
    }

    #[tokio::test]
    async fn test_detail_undated_uses_fallback() {
        let source = MemorySource::new(snapshot());
        let detail = milestone_detail(&source, &Scope::group("g"), 3)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(detail.total_issues, 0);
        assert_eq!(detail.completion_pct, 0.0);
        assert_eq!(detail.burndown.labels, vec!["Start", "Current"]);
    }

    #[tokio::test]
    async fn test_detail_not_found() {
        let source = MemorySource::new(snapshot());
        let report = milestone_detail(&source, &Scope::group("g"), 99).await.unwrap();
        assert_eq!(report.message(), Some("Milestone not found."));
    }
}
