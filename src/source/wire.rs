//! GitLab REST payloads and their mapping onto the model types.
//!
//! Only the fields the reports read are declared; everything else in the
//! responses is ignored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::date_util::parse_date;
use crate::model::{
    Epic, EventAction, Issue, IssueRef, IssueState, LabelEvent, Milestone, MilestoneEvent,
    MilestoneRef, MilestoneState, TimeStats, UserRef,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUser {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireTimeStats {
    #[serde(default)]
    pub time_estimate: Option<i64>,
    #[serde(default)]
    pub total_time_spent: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireReferences {
    pub full: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMilestone {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub group_id: Option<u64>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireIssue {
    pub id: u64,
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub milestone: Option<WireMilestone>,
    #[serde(default)]
    pub assignees: Vec<WireUser>,
    #[serde(default)]
    pub author: Option<WireUser>,
    #[serde(default)]
    pub time_stats: Option<WireTimeStats>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub references: Option<WireReferences>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireLabelEvent {
    pub created_at: DateTime<Utc>,
    /// Null when the label has since been deleted.
    #[serde(default)]
    pub label: Option<WireLabel>,
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMilestoneEvent {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub milestone: Option<WireMilestone>,
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireEpic {
    pub id: u64,
    pub iid: u64,
    pub group_id: u64,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireProject {
    pub name_with_namespace: String,
    pub path_with_namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireGroup {
    pub full_path: String,
}

/// Parse an optional GitLab date; unparseable values become `None`.
fn opt_date(raw: Option<&str>, what: &str) -> Option<NaiveDate> {
    let raw = raw?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        log::warn!("Ignoring unparseable {what} '{raw}'");
    }
    parsed
}

fn parse_action(raw: &str) -> Option<EventAction> {
    match raw {
        "add" => Some(EventAction::Add),
        "remove" => Some(EventAction::Remove),
        _ => None,
    }
}

impl From<WireUser> for UserRef {
    fn from(u: WireUser) -> Self {
        UserRef {
            id: u.id,
            username: u.username,
            name: u.name,
        }
    }
}

impl From<WireMilestone> for MilestoneRef {
    fn from(m: WireMilestone) -> Self {
        MilestoneRef {
            id: m.id,
            due_date: opt_date(m.due_date.as_deref(), "milestone due date"),
            start_date: opt_date(m.start_date.as_deref(), "milestone start date"),
            title: m.title,
        }
    }
}

impl From<WireMilestone> for Milestone {
    fn from(m: WireMilestone) -> Self {
        Milestone {
            id: m.id,
            due_date: opt_date(m.due_date.as_deref(), "milestone due date"),
            start_date: opt_date(m.start_date.as_deref(), "milestone start date"),
            title: m.title,
            state: m
                .state
                .as_deref()
                .map_or(MilestoneState::Active, MilestoneState::from_api),
            group_id: m.group_id,
            web_url: m.web_url,
        }
    }
}

impl From<WireIssue> for Issue {
    fn from(w: WireIssue) -> Self {
        let time_stats = w.time_stats.unwrap_or_default();
        Issue {
            id: w.id,
            iid: w.iid,
            project_id: w.project_id,
            title: w.title,
            description: w.description,
            labels: w.labels,
            state: if w.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Opened
            },
            created_at: w.created_at,
            updated_at: w.updated_at,
            closed_at: w.closed_at,
            due_date: opt_date(w.due_date.as_deref(), "issue due date"),
            milestone: w.milestone.map(MilestoneRef::from),
            assignees: w.assignees.into_iter().map(UserRef::from).collect(),
            author: w.author.map(UserRef::from).unwrap_or_default(),
            time_stats: TimeStats {
                estimate_seconds: time_stats.time_estimate.unwrap_or(0),
                spent_seconds: time_stats.total_time_spent.unwrap_or(0),
            },
            web_url: w.web_url,
            weight: w.weight,
            reference: w.references.and_then(|r| r.full),
        }
    }
}

impl From<WireEpic> for Epic {
    fn from(e: WireEpic) -> Self {
        Epic {
            id: e.id,
            iid: e.iid,
            group_id: e.group_id,
            title: e.title,
        }
    }
}

impl WireLabelEvent {
    /// `None` for events on deleted labels or with an unknown action.
    pub fn into_event(self, issue: IssueRef) -> Option<LabelEvent> {
        let label = self.label?;
        Some(LabelEvent {
            issue,
            label: label.name,
            action: parse_action(&self.action)?,
            created_at: self.created_at,
        })
    }
}

impl WireMilestoneEvent {
    pub fn into_event(self, issue: IssueRef) -> Option<MilestoneEvent> {
        let milestone = self.milestone?;
        Some(MilestoneEvent {
            issue,
            milestone_id: milestone.id,
            milestone_title: milestone.title,
            action: parse_action(&self.action)?,
            created_at: self.created_at,
        })
    }
}
