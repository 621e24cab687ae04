use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

/// Outcome of a report that ran without upstream failure.
///
/// `NoData` carries a user-facing message ("No issues found.") for
/// conditions that are not errors but leave nothing to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Report<T> {
    Ready(T),
    NoData(String),
}

impl<T> Report<T> {
    pub fn no_data(message: impl Into<String>) -> Self {
        Report::NoData(message.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Report::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Report::Ready(v) => Some(v),
            Report::NoData(_) => None,
        }
    }

    /// The no-data message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Report::Ready(_) => None,
            Report::NoData(m) => Some(m),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Report<U> {
        match self {
            Report::Ready(v) => Report::Ready(f(v)),
            Report::NoData(m) => Report::NoData(m),
        }
    }
}

/// Defect escape figures for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EscapeMetrics {
    /// Issues carrying any QA-bug label.
    pub qa_count: u64,
    /// Issues carrying any production-bug label.
    pub prod_count: u64,
    pub total_created: u64,
    /// `total_created - qa_count`; may be negative when labels overlap oddly.
    pub net_total: i64,
    /// Production bugs per QA bug, in percent.
    pub qa_escape_ratio: f64,
    /// QA bugs per net ticket, in percent.
    pub dev_escape_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    /// `YYYY-MM` of the month.
    pub label: String,
    pub metrics: EscapeMetrics,
}

/// Mean turnaround time for issues created in one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TatPoint {
    /// `YYYY-Www`.
    pub week: String,
    pub mean_tat_days: f64,
    pub issue_count: u64,
}

/// One closed label interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageInterval {
    pub label: String,
    pub stage: String,
    pub seconds: i64,
    /// When the label was removed.
    pub ended_at: chrono::DateTime<chrono::Utc>,
}

/// Per-issue stage totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueStageRow {
    pub iid: u64,
    pub title: String,
    pub web_url: String,
    /// Days since 1899-12-30.
    pub created_serial: i64,
    /// Stage → man-days.
    pub stage_man_days: BTreeMap<String, f64>,
    pub total_man_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSeries {
    pub stage: String,
    /// Calendar days per week, aligned with [`TimeInStatus::weeks`].
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeInStatus {
    pub weeks: Vec<String>,
    pub series: Vec<StageSeries>,
    pub issues: Vec<IssueStageRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageLagRow {
    pub project: String,
    pub iid: u64,
    pub title: String,
    /// `type::` value or `NA`.
    pub issue_type: String,
    pub web_url: String,
    pub milestone: String,
    pub due_date: NaiveDate,
    pub assigned_on: NaiveDate,
    pub lag_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Burndown {
    pub labels: Vec<String>,
    pub ideal: Vec<f64>,
    pub actual: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneSummary {
    pub id: u64,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub total_issues: u64,
    pub closed_issues: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneIssueRow {
    pub iid: u64,
    pub title: String,
    pub state: String,
    pub web_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneDetail {
    pub id: u64,
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_issues: u64,
    pub closed_issues: u64,
    pub open_issues: u64,
    pub completion_pct: f64,
    pub issues: Vec<MilestoneIssueRow>,
    pub burndown: Burndown,
}

/// One row of the issue analytics table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueAnalyticsRow {
    pub iid: u64,
    pub issue_type: String,
    pub title: String,
    pub state: String,
    pub web_url: String,
    pub project: String,
    pub created: NaiveDate,
    pub updated: NaiveDate,
    pub closed: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub labels: Vec<String>,
    pub milestone: Option<String>,
    pub assignees: Vec<String>,
    pub author: String,
    pub effort_man_days: f64,
    pub weight: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpicIssueRow {
    pub title: String,
    /// Assignee names, or `Unassigned`.
    pub assignees: String,
    /// `workflow::` value or `NA`.
    pub status: String,
    pub created: NaiveDate,
    pub milestone_due: Option<NaiveDate>,
    pub web_url: String,
    /// `group/project#iid`.
    pub display_ref: String,
}

/// Which slice of a user's issues to report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPeriod {
    /// Open issues assigned to the user.
    Current,
    /// Issues assigned to the user and updated in the last 7 days.
    LastWeek,
}

impl ActivityPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "current" => Some(ActivityPeriod::Current),
            "last_week" => Some(ActivityPeriod::LastWeek),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRow {
    pub iid: u64,
    pub title: String,
    pub workflow: String,
    pub issue_type: String,
    pub created: NaiveDate,
    pub updated: NaiveDate,
    pub estimate_man_days: f64,
    pub web_url: String,
}

/// Value-stream lead and cycle time over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowMetrics {
    pub lead_time_days: Option<f64>,
    pub cycle_time_days: Option<f64>,
}
