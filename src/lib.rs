pub mod classify;
pub mod config;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod model;
pub mod query;
pub mod source;
pub mod url;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

pub use config::{GitlabConfig, Settings};
pub use error::{Error, Result};
pub use metrics::{
    ActivityPeriod, ActivityRow, Burndown, EpicIssueRow, EscapeMetrics, FlowMetrics,
    IssueAnalyticsRow, MilestoneDetail, MilestoneSummary, Report, TatPoint, TimeInStatus,
    TrendPoint, TriageLagOptions, TriageLagRow,
};
pub use model::{Issue, Milestone, Scope, ScopeKind};
pub use query::builder::{IssueQuery, MilestoneQuery, MilestoneState};
pub use query::window::DateWindow;
pub use source::{GitlabClient, IssueSource, MemorySource, Snapshot};
pub use url::{parse_gitlab_url, resolve_epic, resolve_scope, GitlabUrlInfo};

use classify::IssueSuggestions;

/// Main entry point: runs reports against an [`IssueSource`], filling in
/// label lists and stage maps from [`Settings`] when the caller gives none.
pub struct GitlabInsights<S: IssueSource> {
    source: S,
    settings: Settings,
}

impl GitlabInsights<GitlabClient> {
    /// Connect to a live GitLab instance.
    pub fn connect(config: &GitlabConfig, settings: Settings) -> Result<Self> {
        Ok(Self::new(GitlabClient::new(config)?, settings))
    }
}

impl GitlabInsights<MemorySource> {
    /// Run reports offline against a recorded snapshot file.
    pub fn from_snapshot(path: impl AsRef<std::path::Path>, settings: Settings) -> Result<Self> {
        Ok(Self::new(MemorySource::new(Snapshot::load(path)?), settings))
    }
}

impl<S: IssueSource> GitlabInsights<S> {
    pub fn new(source: S, settings: Settings) -> Self {
        Self { source, settings }
    }

    /// Access the issue source (for direct queries in the CLI).
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn labels_or_default(&self, given: &[String], configured: &[String], what: &str) -> Result<Vec<String>> {
        let labels = if given.is_empty() { configured } else { given };
        if labels.is_empty() {
            return Err(Error::Config(format!(
                "no {what} labels given and none configured in settings"
            )));
        }
        Ok(labels.to_vec())
    }

    // ── Defect escape ──────────────────────────────────────────────

    pub async fn escape_metrics(
        &self,
        scope: &Scope,
        window: &DateWindow,
        qa_labels: &[String],
        prod_labels: &[String],
    ) -> Result<EscapeMetrics> {
        let qa = self.labels_or_default(qa_labels, &self.settings.qa_labels, "QA")?;
        let prod = self.labels_or_default(prod_labels, &self.settings.prod_labels, "production")?;
        metrics::compute_escape_metrics(&self.source, scope, window, &qa, &prod).await
    }

    pub async fn escape_trend(
        &self,
        scope: &Scope,
        months_back: u32,
        qa_labels: &[String],
        prod_labels: &[String],
        today: NaiveDate,
    ) -> Result<Vec<TrendPoint>> {
        let qa = self.labels_or_default(qa_labels, &self.settings.qa_labels, "QA")?;
        let prod = self.labels_or_default(prod_labels, &self.settings.prod_labels, "production")?;
        metrics::compute_monthly_trend(&self.source, scope, months_back, &qa, &prod, today).await
    }

    // ── Flow ───────────────────────────────────────────────────────

    pub async fn tat_trend(
        &self,
        scope: &Scope,
        months_back: u32,
        today: NaiveDate,
    ) -> Result<Report<Vec<TatPoint>>> {
        metrics::compute_tat_trend(&self.source, scope, months_back, today).await
    }

    /// Time in status, with `stages` (stage → labels) falling back to the
    /// configured stage map.
    pub async fn time_in_status(
        &self,
        scope: &Scope,
        window: &DateWindow,
        stages: Option<&BTreeMap<String, Vec<String>>>,
    ) -> Result<Report<TimeInStatus>> {
        let configured;
        let stages = match stages {
            Some(s) if !s.is_empty() => s,
            _ => {
                configured = self.settings.stage_map();
                &configured
            }
        };
        if stages.is_empty() {
            return Err(Error::Config(
                "no stage map given and none configured in settings".into(),
            ));
        }
        metrics::compute_time_in_status(&self.source, scope, window, stages).await
    }

    pub async fn triage_lag(
        &self,
        scope: &Scope,
        window: &DateWindow,
        options: &TriageLagOptions,
        today: NaiveDate,
    ) -> Result<Report<Vec<TriageLagRow>>> {
        metrics::compute_triage_lag(&self.source, scope, window, options, today).await
    }

    pub async fn lead_cycle_time(&self, scope: &Scope, window: &DateWindow) -> Result<Report<FlowMetrics>> {
        metrics::lead_cycle_time(&self.source, scope, window).await
    }

    // ── Milestones ─────────────────────────────────────────────────

    pub async fn milestones(&self, group: &Scope, window: &DateWindow) -> Result<Report<Vec<MilestoneSummary>>> {
        metrics::list_milestones(&self.source, group, window).await
    }

    pub async fn milestone_detail(&self, group: &Scope, milestone_id: u64) -> Result<Report<MilestoneDetail>> {
        metrics::milestone_detail(&self.source, group, milestone_id).await
    }

    // ── Issue reports ──────────────────────────────────────────────

    pub async fn issue_analytics(
        &self,
        scope: &Scope,
        query: &IssueQuery,
    ) -> Result<Report<Vec<IssueAnalyticsRow>>> {
        metrics::issue_analytics(&self.source, scope, query).await
    }

    pub async fn epic_report(&self, group: &Scope, epic_iid: u64) -> Result<Report<Vec<EpicIssueRow>>> {
        metrics::epic_report(&self.source, group, epic_iid).await
    }

    pub async fn user_activity(
        &self,
        username: &str,
        period: ActivityPeriod,
        now: DateTime<Utc>,
    ) -> Result<Report<Vec<ActivityRow>>> {
        metrics::user_activity(&self.source, username, period, now).await
    }

    // ── Automations ────────────────────────────────────────────────

    pub async fn label_suggestions(
        &self,
        scope: &Scope,
        window: &DateWindow,
        prefixes: &[String],
    ) -> Result<Report<Vec<IssueSuggestions>>> {
        classify::generate_label_suggestions(&self.source, scope, window, prefixes).await
    }
}
