use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    Epic, Issue, IssueRef, LabelEvent, Milestone, MilestoneEvent, Scope, ScopeKind, StageMedian,
};
use crate::query::builder::{IssueQuery, MilestoneQuery};
use crate::query::window::DateWindow;
use crate::source::IssueSource;

/// An epic inside a snapshot, with its place in the epic tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEpic {
    #[serde(flatten)]
    pub epic: Epic,
    #[serde(default)]
    pub parent_iid: Option<u64>,
    #[serde(default)]
    pub issue_ids: Vec<u64>,
}

/// A recorded copy of everything the reports read from GitLab, for offline
/// and reproducible runs. One snapshot describes one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub issues: Vec<Issue>,
    pub label_events: Vec<LabelEvent>,
    pub milestone_events: Vec<MilestoneEvent>,
    pub milestones: Vec<Milestone>,
    pub project_names: BTreeMap<u64, String>,
    pub epics: Vec<SnapshotEpic>,
    /// `None` means the scope has no value stream.
    pub value_stream: Option<Vec<StageMedian>>,
}

impl Snapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read snapshot {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// [`IssueSource`] over a [`Snapshot`].
///
/// Issue queries are evaluated with [`IssueQuery::matches`]. A project scope
/// with a numeric id narrows issues to that project; any other scope sees
/// the whole snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    snapshot: Snapshot,
}

impl MemorySource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    fn in_scope(scope: Option<&Scope>, issue: &Issue) -> bool {
        match scope {
            Some(s) if s.kind == ScopeKind::Project => match s.id.parse::<u64>() {
                Ok(pid) => issue.project_id == pid,
                Err(_) => true,
            },
            _ => true,
        }
    }
}

#[async_trait]
impl IssueSource for MemorySource {
    async fn list_issues(&self, scope: Option<&Scope>, query: &IssueQuery) -> Result<Vec<Issue>> {
        Ok(self
            .snapshot
            .issues
            .iter()
            .filter(|i| Self::in_scope(scope, i) && query.matches(i))
            .cloned()
            .collect())
    }

    async fn list_label_events(&self, issue: IssueRef) -> Result<Vec<LabelEvent>> {
        Ok(self
            .snapshot
            .label_events
            .iter()
            .filter(|e| e.issue == issue)
            .cloned()
            .collect())
    }

    async fn list_milestone_events(&self, issue: IssueRef) -> Result<Vec<MilestoneEvent>> {
        Ok(self
            .snapshot
            .milestone_events
            .iter()
            .filter(|e| e.issue == issue)
            .cloned()
            .collect())
    }

    async fn list_milestones(&self, _scope: &Scope, query: &MilestoneQuery) -> Result<Vec<Milestone>> {
        Ok(self
            .snapshot
            .milestones
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect())
    }

    async fn get_milestone(&self, _scope: &Scope, milestone_id: u64) -> Result<Option<Milestone>> {
        Ok(self
            .snapshot
            .milestones
            .iter()
            .find(|m| m.id == milestone_id)
            .cloned())
    }

    async fn project_name(&self, project_id: u64) -> Result<String> {
        self.snapshot
            .project_names
            .get(&project_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("project {project_id}")))
    }

    async fn list_epic_issues(&self, _group: &Scope, epic_iid: u64) -> Result<Vec<Issue>> {
        let epic = self
            .snapshot
            .epics
            .iter()
            .find(|e| e.epic.iid == epic_iid)
            .ok_or_else(|| Error::NotFound(format!("epic &{epic_iid}")))?;
        Ok(self
            .snapshot
            .issues
            .iter()
            .filter(|i| epic.issue_ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn list_child_epics(&self, _group: &Scope, epic_iid: u64) -> Result<Vec<Epic>> {
        Ok(self
            .snapshot
            .epics
            .iter()
            .filter(|e| e.parent_iid == Some(epic_iid))
            .map(|e| e.epic.clone())
            .collect())
    }

    async fn value_stream_stages(
        &self,
        _scope: &Scope,
        _window: &DateWindow,
    ) -> Result<Option<Vec<StageMedian>>> {
        Ok(self.snapshot.value_stream.clone())
    }
}
