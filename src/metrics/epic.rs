use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::error::Result;
use crate::metrics::types::{EpicIssueRow, Report};
use crate::model::{Issue, Scope};
use crate::source::IssueSource;

/// `group/project#iid` for an issue, from its full reference when known.
fn display_ref(issue: &Issue) -> String {
    match issue.reference.as_deref() {
        Some(full) => {
            let path = full.split('#').next().unwrap_or(full);
            format!("{path}#{}", issue.iid)
        }
        None => format!("{}#{}", issue.project_id, issue.iid),
    }
}

/// Issues of an epic and of every epic below it, deduplicated by issue id.
///
/// Descendants are walked breadth-first with a visited set, so a cycle in
/// the epic tree cannot loop. Only a failure on the root epic aborts; a
/// failing descendant is logged and skipped.
pub async fn collect_epic_issues<S: IssueSource + ?Sized>(
    source: &S,
    group: &Scope,
    epic_iid: u64,
) -> Result<Vec<Issue>> {
    let mut issues: BTreeMap<u64, Issue> = BTreeMap::new();
    let mut visited: HashSet<u64> = HashSet::new();
    let mut queue: VecDeque<u64> = VecDeque::from([epic_iid]);

    while let Some(iid) = queue.pop_front() {
        if !visited.insert(iid) {
            continue;
        }
        let is_root = iid == epic_iid;

        match source.list_epic_issues(group, iid).await {
            Ok(found) => {
                log::debug!("epic &{iid}: {} issues", found.len());
                for issue in found {
                    issues.entry(issue.id).or_insert(issue);
                }
            }
            Err(e) if is_root => return Err(e),
            Err(e) => {
                log::error!("Skipping issues of epic &{iid}: {e}");
                continue;
            }
        }

        match source.list_child_epics(group, iid).await {
            Ok(children) => queue.extend(children.into_iter().map(|c| c.iid)),
            Err(e) if is_root => return Err(e),
            Err(e) => log::error!("Skipping children of epic &{iid}: {e}"),
        }
    }

    log::info!(
        "Epic &{epic_iid}: {} issues across {} epics",
        issues.len(),
        visited.len()
    );
    Ok(issues.into_values().collect())
}

/// Epic report rows, newest issue first.
pub async fn epic_report<S: IssueSource + ?Sized>(
    source: &S,
    group: &Scope,
    epic_iid: u64,
) -> Result<Report<Vec<EpicIssueRow>>> {
    let mut issues = collect_epic_issues(source, group, epic_iid).await?;
    if issues.is_empty() {
        return Ok(Report::no_data("No issues found for this epic."));
    }
    issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Report::Ready(
        issues
            .iter()
            .map(|issue| EpicIssueRow {
                title: issue.title.clone(),
                assignees: if issue.assignees.is_empty() {
                    "Unassigned".to_string()
                } else {
                    issue.assignee_names().join(", ")
                },
                status: issue.scoped_value("workflow").unwrap_or("NA").to_string(),
                created: issue.created_at.date_naive(),
                milestone_due: issue.milestone.as_ref().and_then(|m| m.due_date),
                web_url: issue.web_url.clone(),
                display_ref: display_ref(issue),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Epic;
    use crate::source::fixtures::*;
    use crate::source::memory::SnapshotEpic;
    use crate::source::{MemorySource, Snapshot};

    fn epic(iid: u64, parent: Option<u64>, issue_ids: &[u64]) -> SnapshotEpic {
        SnapshotEpic {
            epic: Epic {
                id: 100 + iid,
                iid,
                group_id: 1,
                title: format!("Epic {iid}"),
            },
            parent_iid: parent,
            issue_ids: issue_ids.to_vec(),
        }
    }

    fn snapshot(epics: Vec<SnapshotEpic>) -> Snapshot {
        let mut assigned = issue(2, "2024-02-01T00:00:00Z", &["workflow::review"]);
        assigned.assignees = vec![user("Ana"), user("Bo")];
        Snapshot {
            issues: vec![
                issue(1, "2024-01-01T00:00:00Z", &[]),
                assigned,
                issue(3, "2024-03-01T00:00:00Z", &[]),
                issue(4, "2024-04-01T00:00:00Z", &[]),
            ],
            epics,
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn test_descendants_and_dedup() {
        let source = MemorySource::new(snapshot(vec![
            epic(1, None, &[1, 2]),
            epic(2, Some(1), &[2, 3]),
            epic(3, Some(2), &[4]),
        ]));
        let rows = epic_report(&source, &Scope::group("g"), 1)
            .await
            .unwrap()
            .ready()
            .unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Issue 4", "Issue 3", "Issue 2", "Issue 1"]);
        assert_eq!(rows[2].assignees, "Ana, Bo");
        assert_eq!(rows[2].status, "review");
        assert_eq!(rows[0].assignees, "Unassigned");
        assert_eq!(rows[0].status, "NA");
        assert_eq!(rows[0].display_ref, "g/p#4");
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        // 1 -> 2 -> 1: each epic lists the other as its child.
        let source = MemorySource::new(snapshot(vec![epic(1, Some(2), &[1]), epic(2, Some(1), &[3])]));
        let issues = collect_epic_issues(&source, &Scope::group("g"), 1).await.unwrap();
        assert_eq!(issues.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_root_is_error() {
        let source = MemorySource::new(snapshot(Vec::new()));
        assert!(epic_report(&source, &Scope::group("g"), 9).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_epic() {
        let source = MemorySource::new(snapshot(vec![epic(1, None, &[])]));
        let report = epic_report(&source, &Scope::group("g"), 1).await.unwrap();
        assert_eq!(report.message(), Some("No issues found for this epic."));
    }

    #[test]
    fn test_display_ref_without_reference() {
        let mut i = issue(7, "2024-01-01T00:00:00Z", &[]);
        i.reference = None;
        assert_eq!(display_ref(&i), "10#7");
    }
}
