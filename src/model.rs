use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether a scope is a GitLab group or project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Group,
    Project,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Group => "group",
            ScopeKind::Project => "project",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "group" => Ok(ScopeKind::Group),
            "project" => Ok(ScopeKind::Project),
            other => Err(Error::InvalidIdentifier(format!(
                "unknown scope type '{other}' (expected group or project)"
            ))),
        }
    }
}

/// Query boundary for issues and milestones: a group or project, addressed
/// either by numeric id or by full path (`my-group/sub/project`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: String,
}

impl Scope {
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Group,
            id: id.into(),
        }
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Project,
            id: id.into(),
        }
    }

    /// Key used in logs and report headers, e.g. `group:42`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Opened,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Opened => "opened",
            IssueState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: u64,
    pub username: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStats {
    pub estimate_seconds: i64,
    pub spent_seconds: i64,
}

/// Milestone as embedded in an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRef {
    pub id: u64,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
}

/// Identifies one issue across the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueRef {
    pub project_id: u64,
    pub iid: u64,
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project_id, self.iid)
    }
}

/// Snapshot of a GitLab issue as fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub milestone: Option<MilestoneRef>,
    pub assignees: Vec<UserRef>,
    pub author: UserRef,
    pub time_stats: TimeStats,
    pub web_url: String,
    pub weight: Option<u32>,
    /// Full reference such as `group/project#12`.
    pub reference: Option<String>,
}

impl Issue {
    pub fn issue_ref(&self) -> IssueRef {
        IssueRef {
            project_id: self.project_id,
            iid: self.iid,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == IssueState::Closed
    }

    /// Value of the first label in `scope`, e.g. `bug` for `type::bug`.
    pub fn scoped_value(&self, scope: &str) -> Option<&str> {
        scoped_value(&self.labels, scope)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scoped_value(scope).is_some()
    }

    /// Lowercased title + description, the text the classifier matches against.
    pub fn content(&self) -> String {
        format!(
            "{} {}",
            self.title.to_lowercase(),
            self.description.as_deref().unwrap_or("").to_lowercase()
        )
    }

    pub fn assignee_names(&self) -> Vec<&str> {
        self.assignees.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Split a scoped label `scope::value` at its last `::`.
/// Returns `None` for labels that carry no scope.
pub fn split_scoped(label: &str) -> Option<(&str, &str)> {
    label.rsplit_once("::")
}

/// Value of the first label whose prefix is `scope::`; first match wins.
pub fn scoped_value<'a>(labels: &'a [String], scope: &str) -> Option<&'a str> {
    let prefix = format!("{scope}::");
    labels
        .iter()
        .find_map(|l| l.strip_prefix(prefix.as_str()))
}

/// Split a comma-separated label list, trimming blanks: `"a, b,,c"` → `[a, b, c]`.
pub fn parse_label_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEvent {
    pub issue: IssueRef,
    pub label: String,
    pub action: EventAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneEvent {
    pub issue: IssueRef,
    pub milestone_id: u64,
    pub milestone_title: String,
    pub action: EventAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneState {
    #[default]
    Active,
    Closed,
}

impl MilestoneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneState::Active => "active",
            MilestoneState::Closed => "closed",
        }
    }

    /// GitLab only reports `active` and `closed`; anything else is treated
    /// as active.
    pub fn from_api(s: &str) -> Self {
        if s.eq_ignore_ascii_case("closed") {
            MilestoneState::Closed
        } else {
            MilestoneState::Active
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: u64,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub state: MilestoneState,
    pub group_id: Option<u64>,
    pub web_url: Option<String>,
}

impl Milestone {
    pub fn is_active(&self) -> bool {
        self.state == MilestoneState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epic {
    pub id: u64,
    pub iid: u64,
    pub group_id: u64,
    pub title: String,
}

/// Median of one value-stream stage over a timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMedian {
    pub name: String,
    pub median_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scoped_value_first_match_wins() {
        let ls = labels(&["frontend", "type::bug", "type::enhancement"]);
        assert_eq!(scoped_value(&ls, "type"), Some("bug"));
        assert_eq!(scoped_value(&ls, "workflow"), None);
    }

    #[test]
    fn test_scoped_value_requires_full_prefix() {
        let ls = labels(&["typed::x", "type:y"]);
        assert_eq!(scoped_value(&ls, "type"), None);
    }

    #[test]
    fn test_split_scoped() {
        assert_eq!(split_scoped("workflow::review"), Some(("workflow", "review")));
        assert_eq!(split_scoped("a::b::c"), Some(("a::b", "c")));
        assert_eq!(split_scoped("plain"), None);
    }

    #[test]
    fn test_parse_label_list() {
        assert_eq!(
            parse_label_list(" bug::qa, bug::prod ,, "),
            vec!["bug::qa".to_string(), "bug::prod".to_string()]
        );
        assert!(parse_label_list("").is_empty());
    }

    #[test]
    fn test_scope_kind_parse() {
        assert_eq!(ScopeKind::parse("Group").unwrap(), ScopeKind::Group);
        assert_eq!(ScopeKind::parse("project").unwrap(), ScopeKind::Project);
        assert!(ScopeKind::parse("team").is_err());
    }

    #[test]
    fn test_scope_key() {
        assert_eq!(Scope::group("42").key(), "group:42");
        assert_eq!(Scope::project("a/b").to_string(), "project:a/b");
    }
}
