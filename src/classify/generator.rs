use serde::Serialize;

use crate::classify::{suggest_for_issue, Suggestion};
use crate::error::{Error, Result};
use crate::metrics::Report;
use crate::model::{IssueState, Scope};
use crate::query::builder::IssueQuery;
use crate::query::window::DateWindow;
use crate::source::IssueSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueSuggestions {
    pub project_id: u64,
    pub iid: u64,
    pub title: String,
    pub web_url: String,
    pub labels: Vec<String>,
    /// Requested prefixes no label starts with.
    pub missing_prefixes: Vec<String>,
    pub suggestions: Vec<Suggestion>,
}

/// Suggest labels for open issues created in `window` that lack a label
/// starting with any of `prefixes`.
pub async fn generate_label_suggestions<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    window: &DateWindow,
    prefixes: &[String],
) -> Result<Report<Vec<IssueSuggestions>>> {
    if prefixes.is_empty() {
        return Err(Error::Other(
            "at least one label prefix is required".into(),
        ));
    }

    let query = IssueQuery::new()
        .state(IssueState::Opened)
        .created_in(window);
    let issues = source.list_issues(Some(scope), &query).await?;
    log::info!("Checking {} open issues in {scope} for {prefixes:?}", issues.len());

    let mut out = Vec::new();
    for issue in issues {
        let missing: Vec<String> = prefixes
            .iter()
            .filter(|p| !issue.labels.iter().any(|l| l.starts_with(p.as_str())))
            .cloned()
            .collect();
        if missing.is_empty() {
            continue;
        }
        out.push(IssueSuggestions {
            suggestions: suggest_for_issue(&issue),
            project_id: issue.project_id,
            iid: issue.iid,
            title: issue.title,
            web_url: issue.web_url,
            labels: issue.labels,
            missing_prefixes: missing,
        });
    }

    if out.is_empty() {
        return Ok(Report::no_data("No issues found missing the requested labels."));
    }
    Ok(Report::Ready(out))
}
