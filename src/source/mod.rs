pub mod gitlab;
pub mod memory;
pub mod rate_limit;
pub mod wire;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Epic, Issue, IssueRef, LabelEvent, Milestone, MilestoneEvent, Scope, StageMedian};
use crate::query::builder::{IssueQuery, MilestoneQuery};
use crate::query::window::DateWindow;

pub use gitlab::GitlabClient;
pub use memory::{MemorySource, Snapshot};

/// Read-only access to issues, events and milestones.
///
/// Every report fetches through this trait, so the aggregation code runs the
/// same against the live API ([`GitlabClient`]) and a recorded snapshot
/// ([`MemorySource`]).
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// List issues in `scope` (or instance-wide when `None`) matching `query`.
    /// Only one label can be filtered per call; OR over labels is the
    /// caller's job (see [`fetch_issues_any_label`]).
    async fn list_issues(&self, scope: Option<&Scope>, query: &IssueQuery) -> Result<Vec<Issue>>;

    async fn list_label_events(&self, issue: IssueRef) -> Result<Vec<LabelEvent>>;

    async fn list_milestone_events(&self, issue: IssueRef) -> Result<Vec<MilestoneEvent>>;

    async fn list_milestones(&self, scope: &Scope, query: &MilestoneQuery) -> Result<Vec<Milestone>>;

    /// `Ok(None)` when the milestone does not exist in `scope`.
    async fn get_milestone(&self, scope: &Scope, milestone_id: u64) -> Result<Option<Milestone>>;

    /// Display name (with namespace) of a project.
    async fn project_name(&self, project_id: u64) -> Result<String>;

    /// Issues attached directly to an epic (not its children).
    async fn list_epic_issues(&self, group: &Scope, epic_iid: u64) -> Result<Vec<Issue>>;

    async fn list_child_epics(&self, group: &Scope, epic_iid: u64) -> Result<Vec<Epic>>;

    /// Stage medians of the scope's first value stream over `window`.
    /// `Ok(None)` when the scope has no value stream.
    async fn value_stream_stages(
        &self,
        scope: &Scope,
        window: &DateWindow,
    ) -> Result<Option<Vec<StageMedian>>>;
}

/// Issues matching ANY of `labels`: one query per label on top of `base`,
/// merged by issue id. Labels are queried in order and the result is
/// ordered by id, so the output does not depend on response order.
pub async fn fetch_issues_any_label<S: IssueSource + ?Sized>(
    source: &S,
    scope: Option<&Scope>,
    labels: &[String],
    base: &IssueQuery,
) -> Result<Vec<Issue>> {
    let mut merged: BTreeMap<u64, Issue> = BTreeMap::new();
    for label in labels {
        let query = base.clone().label(label);
        let issues = source.list_issues(scope, &query).await?;
        log::debug!("label '{label}': {} issues", issues.len());
        for issue in issues {
            merged.insert(issue.id, issue);
        }
    }
    Ok(merged.into_values().collect())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_fetch_any_label_dedupes_by_id() {
        let source = MemorySource::new(Snapshot {
            issues: vec![
                issue(1, "2024-01-02T00:00:00Z", &["bug::qa", "bug::regression"]),
                issue(2, "2024-01-03T00:00:00Z", &["bug::regression"]),
                issue(3, "2024-01-04T00:00:00Z", &["feature"]),
            ],
            ..Snapshot::default()
        });
        let labels = vec!["bug::qa".to_string(), "bug::regression".to_string()];
        let issues = fetch_issues_any_label(&source, None, &labels, &IssueQuery::new())
            .await
            .unwrap();
        let ids: Vec<u64> = issues.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fetch_any_label_empty_list() {
        let source = MemorySource::new(Snapshot {
            issues: vec![issue(1, "2024-01-02T00:00:00Z", &["bug::qa"])],
            ..Snapshot::default()
        });
        let issues = fetch_issues_any_label(&source, None, &[], &IssueQuery::new())
            .await
            .unwrap();
        assert!(issues.is_empty());
    }
}
