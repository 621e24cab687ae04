use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

use crate::model::{IssueState, Milestone};
pub use crate::model::MilestoneState;
use crate::query::window::DateWindow;

/// Filters for an issue listing. Translated into GitLab REST query
/// parameters by [`IssueQuery::to_params`]; an in-memory source can apply
/// the same filters with [`IssueQuery::matches`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssueQuery {
    label: Option<String>,
    state: Option<IssueState>,
    created_after: Option<DateTime<Utc>>,
    created_before: Option<DateTime<Utc>>,
    updated_after: Option<DateTime<Utc>>,
    milestone: Option<String>,
    assignees: Vec<String>,
    author: Option<String>,
    search: Option<String>,
}

impl IssueQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to issues carrying this single label.
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn state(mut self, state: IssueState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn created_after(mut self, ts: DateTime<Utc>) -> Self {
        self.created_after = Some(ts);
        self
    }

    /// Created strictly before `ts`. GitLab's `created_before` is inclusive,
    /// so the REST parameter is sent one millisecond earlier.
    pub fn created_before(mut self, ts: DateTime<Utc>) -> Self {
        self.created_before = Some(ts);
        self
    }

    /// Issues created in `[window.start, window.end)`.
    pub fn created_in(self, window: &DateWindow) -> Self {
        self.created_after(window.start).created_before(window.end)
    }

    pub fn updated_after(mut self, ts: DateTime<Utc>) -> Self {
        self.updated_after = Some(ts);
        self
    }

    /// Restrict to a milestone, by title.
    pub fn milestone(mut self, title: &str) -> Self {
        self.milestone = Some(title.to_string());
        self
    }

    pub fn assignee(mut self, username: &str) -> Self {
        self.assignees.push(username.to_string());
        self
    }

    pub fn author(mut self, username: &str) -> Self {
        self.author = Some(username.to_string());
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    pub fn label_filter(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// GitLab REST query parameters for this filter set.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = Vec::new();

        if let Some(ref label) = self.label {
            params.push(("labels".into(), label.clone()));
        }
        if let Some(state) = self.state {
            params.push(("state".into(), state.as_str().into()));
        }
        if let Some(ts) = self.created_after {
            params.push(("created_after".into(), iso(ts)));
        }
        if let Some(ts) = self.created_before {
            let last = ts - Duration::milliseconds(1);
            params.push((
                "created_before".into(),
                last.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        if let Some(ts) = self.updated_after {
            params.push(("updated_after".into(), iso(ts)));
        }
        if let Some(ref title) = self.milestone {
            params.push(("milestone".into(), title.clone()));
        }
        match self.assignees.as_slice() {
            [] => {}
            [one] => params.push(("assignee_username".into(), one.clone())),
            many => {
                for a in many {
                    params.push(("assignee_username[]".into(), a.clone()));
                }
            }
        }
        if let Some(ref author) = self.author {
            params.push(("author_username".into(), author.clone()));
        }
        if let Some(ref text) = self.search {
            params.push(("search".into(), text.clone()));
        }

        params
    }

    /// Apply the filters to an issue in memory. Free-text search matches the
    /// title or description case-insensitively.
    pub fn matches(&self, issue: &crate::model::Issue) -> bool {
        if let Some(ref label) = self.label {
            if !issue.labels.iter().any(|l| l == label) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if issue.state != state {
                return false;
            }
        }
        if let Some(ts) = self.created_after {
            if issue.created_at < ts {
                return false;
            }
        }
        if let Some(ts) = self.created_before {
            if issue.created_at >= ts {
                return false;
            }
        }
        if let Some(ts) = self.updated_after {
            if issue.updated_at < ts {
                return false;
            }
        }
        if let Some(ref title) = self.milestone {
            if issue.milestone.as_ref().map(|m| &m.title) != Some(title) {
                return false;
            }
        }
        if !self.assignees.is_empty()
            && !issue
                .assignees
                .iter()
                .any(|a| self.assignees.contains(&a.username))
        {
            return false;
        }
        if let Some(ref author) = self.author {
            if &issue.author.username != author {
                return false;
            }
        }
        if let Some(ref text) = self.search {
            let needle = text.to_lowercase();
            if !issue.content().contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Filters for a milestone listing. GitLab only filters by state
/// server-side; the due-date range is applied with [`MilestoneQuery::matches`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MilestoneQuery {
    state: Option<MilestoneState>,
    due_after: Option<NaiveDate>,
    due_before: Option<NaiveDate>,
}

impl MilestoneQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: MilestoneState) -> Self {
        self.state = Some(state);
        self
    }

    /// Due on or after this date.
    pub fn due_after(mut self, d: NaiveDate) -> Self {
        self.due_after = Some(d);
        self
    }

    /// Due on or before this date.
    pub fn due_before(mut self, d: NaiveDate) -> Self {
        self.due_before = Some(d);
        self
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(state) = self.state {
            params.push(("state".to_string(), state.as_str().to_string()));
        }
        params
    }

    /// Milestones without a due date never match a due-date bound.
    pub fn matches(&self, m: &Milestone) -> bool {
        if let Some(state) = self.state {
            if m.state != state {
                return false;
            }
        }
        if self.due_after.is_none() && self.due_before.is_none() {
            return true;
        }
        let Some(due) = m.due_date else {
            return false;
        };
        if let Some(after) = self.due_after {
            if due < after {
                return false;
            }
        }
        if let Some(before) = self.due_before {
            if due > before {
                return false;
            }
        }
        true
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
