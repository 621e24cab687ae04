use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::GitlabConfig;
use crate::error::{Error, Result};
use crate::model::{
    Epic, Issue, IssueRef, LabelEvent, Milestone, MilestoneEvent, Scope, ScopeKind, StageMedian,
};
use crate::query::builder::{IssueQuery, MilestoneQuery};
use crate::query::window::DateWindow;
use crate::source::rate_limit::{self, MAX_RETRIES};
use crate::source::wire::{
    WireEpic, WireGroup, WireIssue, WireLabelEvent, WireMilestone, WireMilestoneEvent, WireProject,
};
use crate::source::IssueSource;

const VALUE_STREAMS_QUERY: &str = r#"
query GetValueStreams($fullPath: ID!) {
  SCOPE(fullPath: $fullPath) {
    valueStreams {
      nodes { id name }
    }
  }
}"#;

const STAGE_METRICS_QUERY: &str = r#"
query GetStageMetrics($fullPath: ID!, $vsId: [AnalyticsCycleAnalyticsValueStreamID!], $startDate: Date!, $endDate: Date!) {
  SCOPE(fullPath: $fullPath) {
    valueStreams(ids: $vsId) {
      nodes {
        stages {
          nodes {
            name
            metrics(timeframe: { start: $startDate, end: $endDate }) {
              median { value }
            }
          }
        }
      }
    }
  }
}"#;

/// [`IssueSource`] backed by the GitLab REST (v4) and GraphQL APIs.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    per_page: u32,
}

impl GitlabClient {
    pub fn new(config: &GitlabConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::UrlParse(format!("{}: {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(Error::UrlParse(format!("{} is not a base URL", config.url)));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base,
            token: config.token.clone(),
            per_page: config.per_page,
        })
    }

    /// `{base}/api/v4/{segments...}`. Segments are percent-encoded, so a
    /// full path like `group/project` becomes a single `group%2Fproject`.
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::UrlParse(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }

    fn graphql_url(&self) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::UrlParse(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "graphql"]);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => req.header("PRIVATE-TOKEN", token),
            None => req,
        }
    }

    /// Send a request, retrying 429s. Returns the response whatever its
    /// final status; callers decide how to treat non-success codes.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let resp = self.authorize(build()).send().await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                rate_limit::backoff_sleep(attempt, resp.headers()).await;
                attempt += 1;
                continue;
            }
            return Ok(resp);
        }
    }

    async fn error_for_status(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        log::error!("GitLab request failed with HTTP {}: {body}", status.as_u16());
        Err(Error::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_one<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.api_url(segments)?;
        log::debug!("GET {url}");
        let resp = self.send_with_retry(|| self.http.get(url.clone())).await?;
        let resp = Self::error_for_status(resp).await?;
        Ok(serde_json::from_str(&resp.text().await?)?)
    }

    /// Like [`Self::get_one`] but a 404 is `Ok(None)`.
    async fn get_optional<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>> {
        let url = self.api_url(segments)?;
        log::debug!("GET {url}");
        let resp = self.send_with_retry(|| self.http.get(url.clone())).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::error_for_status(resp).await?;
        Ok(Some(serde_json::from_str(&resp.text().await?)?))
    }

    /// Fetch every page of a list endpoint, following `x-next-page`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(String, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let mut url = self.api_url(segments)?;
            url.query_pairs_mut()
                .extend_pairs(params)
                .append_pair("per_page", &self.per_page.to_string())
                .append_pair("page", &page.to_string());
            log::debug!("GET {url}");

            let resp = self.send_with_retry(|| self.http.get(url.clone())).await?;
            let resp = Self::error_for_status(resp).await?;
            let next = resp
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            let batch: Vec<T> = serde_json::from_str(&resp.text().await?)?;
            items.extend(batch);

            match next {
                Some(n) if n > page => page = n,
                _ => break,
            }
        }
        Ok(items)
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let url = self.graphql_url()?;
        let payload = json!({ "query": query, "variables": variables });
        log::debug!("POST {url}");
        let resp = self
            .send_with_retry(|| self.http.post(url.clone()).json(&payload))
            .await?;
        let resp = Self::error_for_status(resp).await?;
        let body: GraphQlResponse = serde_json::from_str(&resp.text().await?)?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            log::error!("GraphQL errors: {}", messages.join("; "));
            return Err(Error::GraphQl(messages.join("; ")));
        }
        body.data
            .ok_or_else(|| Error::GraphQl("response carried no data".into()))
    }

    /// Full path of a scope. Numeric ids are resolved through REST; anything
    /// else is assumed to already be a path.
    pub async fn full_path(&self, scope: &Scope) -> Result<String> {
        if scope.id.parse::<u64>().is_err() {
            return Ok(scope.id.clone());
        }
        match scope.kind {
            ScopeKind::Group => {
                let group: WireGroup = self.get_one(&["groups", &scope.id]).await?;
                Ok(group.full_path)
            }
            ScopeKind::Project => {
                let project: WireProject = self.get_one(&["projects", &scope.id]).await?;
                Ok(project.path_with_namespace)
            }
        }
    }
}

fn scope_segment(scope: &Scope) -> &'static str {
    match scope.kind {
        ScopeKind::Group => "groups",
        ScopeKind::Project => "projects",
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

/// `data.<scope>.valueStreams.nodes`, or an empty list when any level is null.
fn value_stream_nodes<'a>(data: &'a Value, kind: ScopeKind) -> &'a [Value] {
    data.get(kind.as_str())
        .and_then(|s| s.get("valueStreams"))
        .and_then(|v| v.get("nodes"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Median seconds of a stage node. GitLab has returned `metrics` both as an
/// object and as a one-element list.
fn stage_median(stage: &Value) -> Option<f64> {
    let metrics = stage.get("metrics")?;
    let metrics = match metrics.as_array() {
        Some(list) => list.first()?,
        None => metrics,
    };
    metrics.get("median")?.get("value")?.as_f64()
}

#[async_trait]
impl IssueSource for GitlabClient {
    async fn list_issues(&self, scope: Option<&Scope>, query: &IssueQuery) -> Result<Vec<Issue>> {
        let mut params = query.to_params();
        let wire: Vec<WireIssue> = match scope {
            Some(scope) => {
                if scope.kind == ScopeKind::Group {
                    params.push(("include_subgroups".into(), "true".into()));
                }
                self.get_all(&[scope_segment(scope), &scope.id, "issues"], &params)
                    .await?
            }
            None => {
                params.push(("scope".into(), "all".into()));
                self.get_all(&["issues"], &params).await?
            }
        };
        Ok(wire.into_iter().map(Issue::from).collect())
    }

    async fn list_label_events(&self, issue: IssueRef) -> Result<Vec<LabelEvent>> {
        let (pid, iid) = (issue.project_id.to_string(), issue.iid.to_string());
        let wire: Vec<WireLabelEvent> = self
            .get_all(
                &["projects", &pid, "issues", &iid, "resource_label_events"],
                &[],
            )
            .await?;
        Ok(wire.into_iter().filter_map(|e| e.into_event(issue)).collect())
    }

    async fn list_milestone_events(&self, issue: IssueRef) -> Result<Vec<MilestoneEvent>> {
        let (pid, iid) = (issue.project_id.to_string(), issue.iid.to_string());
        let wire: Vec<WireMilestoneEvent> = self
            .get_all(
                &["projects", &pid, "issues", &iid, "resource_milestone_events"],
                &[],
            )
            .await?;
        Ok(wire.into_iter().filter_map(|e| e.into_event(issue)).collect())
    }

    async fn list_milestones(&self, scope: &Scope, query: &MilestoneQuery) -> Result<Vec<Milestone>> {
        let wire: Vec<WireMilestone> = self
            .get_all(&[scope_segment(scope), &scope.id, "milestones"], &query.to_params())
            .await?;
        Ok(wire
            .into_iter()
            .map(Milestone::from)
            .filter(|m| query.matches(m))
            .collect())
    }

    async fn get_milestone(&self, scope: &Scope, milestone_id: u64) -> Result<Option<Milestone>> {
        let id = milestone_id.to_string();
        let wire: Option<WireMilestone> = self
            .get_optional(&[scope_segment(scope), &scope.id, "milestones", &id])
            .await?;
        Ok(wire.map(Milestone::from))
    }

    async fn project_name(&self, project_id: u64) -> Result<String> {
        let project: WireProject = self.get_one(&["projects", &project_id.to_string()]).await?;
        Ok(project.name_with_namespace)
    }

    async fn list_epic_issues(&self, group: &Scope, epic_iid: u64) -> Result<Vec<Issue>> {
        let iid = epic_iid.to_string();
        let wire: Vec<WireIssue> = self
            .get_all(&["groups", &group.id, "epics", &iid, "issues"], &[])
            .await?;
        Ok(wire.into_iter().map(Issue::from).collect())
    }

    async fn list_child_epics(&self, group: &Scope, epic_iid: u64) -> Result<Vec<Epic>> {
        let iid = epic_iid.to_string();
        let wire: Vec<WireEpic> = self
            .get_all(&["groups", &group.id, "epics", &iid, "epics"], &[])
            .await?;
        Ok(wire.into_iter().map(Epic::from).collect())
    }

    async fn value_stream_stages(
        &self,
        scope: &Scope,
        window: &DateWindow,
    ) -> Result<Option<Vec<StageMedian>>> {
        let full_path = self.full_path(scope).await?;
        let kind = scope.kind;

        let streams_query = VALUE_STREAMS_QUERY.replace("SCOPE", kind.as_str());
        let data = self
            .graphql(&streams_query, json!({ "fullPath": full_path }))
            .await?;
        let Some(stream) = value_stream_nodes(&data, kind).first() else {
            return Ok(None);
        };
        let stream_id = stream
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::GraphQl("value stream without id".into()))?
            .to_string();
        log::info!(
            "Using value stream '{}' ({stream_id}) for {scope}",
            stream.get("name").and_then(Value::as_str).unwrap_or("?")
        );

        let metrics_query = STAGE_METRICS_QUERY.replace("SCOPE", kind.as_str());
        let variables = json!({
            "fullPath": full_path,
            "vsId": [stream_id],
            "startDate": window.start_date().format("%Y-%m-%d").to_string(),
            "endDate": window.last_date().format("%Y-%m-%d").to_string(),
        });
        let data = self.graphql(&metrics_query, variables).await?;
        let stream = value_stream_nodes(&data, kind)
            .first()
            .ok_or_else(|| Error::GraphQl("could not retrieve metrics for the value stream".into()))?;

        let stages = stream
            .get("stages")
            .and_then(|s| s.get("nodes"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Ok(Some(
            stages
                .iter()
                .filter_map(|stage| {
                    let name = stage.get("name")?.as_str()?.to_string();
                    Some(StageMedian {
                        name,
                        median_seconds: stage_median(stage),
                    })
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::date_util::start_of_day;

    fn client(server: &MockServer) -> GitlabClient {
        let config = GitlabConfig::default()
            .with_url(server.uri())
            .with_token("glpat-test")
            .with_per_page(2);
        GitlabClient::new(&config).unwrap()
    }

    fn issue_json(id: u64) -> Value {
        json!({
            "id": id, "iid": id, "project_id": 7, "title": format!("Issue {id}"),
            "state": "opened", "labels": ["bug::qa"],
            "created_at": "2024-01-05T10:00:00Z", "updated_at": "2024-01-05T10:00:00Z",
            "web_url": format!("https://gitlab.example.com/g/p/-/issues/{id}")
        })
    }

    #[test]
    fn test_api_url_encodes_full_paths() {
        let config = GitlabConfig::default().with_url("https://gitlab.example.com/gitlab/");
        let client = GitlabClient::new(&config).unwrap();
        let url = client.api_url(&["groups", "acme/platform", "issues"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://gitlab.example.com/gitlab/api/v4/groups/acme%2Fplatform/issues"
        );
    }

    #[test]
    fn test_rejects_bad_url() {
        let config = GitlabConfig::default().with_url("not a url");
        assert!(matches!(GitlabClient::new(&config), Err(Error::UrlParse(_))));
    }

    #[tokio::test]
    async fn test_list_issues_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups/42/issues"))
            .and(query_param("page", "1"))
            .and(query_param("labels", "bug::qa"))
            .and(query_param("include_subgroups", "true"))
            .and(header("PRIVATE-TOKEN", "glpat-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-next-page", "2")
                    .set_body_json(json!([issue_json(1), issue_json(2)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups/42/issues"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-next-page", "")
                    .set_body_json(json!([issue_json(3)])),
            )
            .mount(&server)
            .await;

        let issues = client(&server)
            .list_issues(Some(&Scope::group("42")), &IssueQuery::new().label("bug::qa"))
            .await
            .unwrap();
        let ids: Vec<u64> = issues.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_instance_wide_issues_use_scope_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/issues"))
            .and(query_param("scope", "all"))
            .and(query_param("assignee_username", "ana"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_json(9)])))
            .mount(&server)
            .await;

        let issues = client(&server)
            .list_issues(None, &IssueQuery::new().assignee("ana"))
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[tokio::test]
    async fn test_retries_rate_limited_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name_with_namespace": "Acme / Shop",
                "path_with_namespace": "acme/shop"
            })))
            .mount(&server)
            .await;

        let name = client(&server).project_name(7).await.unwrap();
        assert_eq!(name, "Acme / Shop");
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7"))
            .respond_with(ResponseTemplate::new(403).set_body_string("403 Forbidden"))
            .mount(&server)
            .await;

        match client(&server).project_name(7).await {
            Err(Error::Http { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "403 Forbidden");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_milestone_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups/42/milestones/5"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let m = client(&server)
            .get_milestone(&Scope::group("42"), 5)
            .await
            .unwrap();
        assert!(m.is_none());
    }

    #[tokio::test]
    async fn test_label_events_skip_deleted_labels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/issues/3/resource_label_events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"created_at": "2024-02-01T09:00:00Z", "label": {"name": "workflow::qa"}, "action": "add"},
                {"created_at": "2024-02-02T09:00:00Z", "label": null, "action": "add"}
            ])))
            .mount(&server)
            .await;

        let events = client(&server)
            .list_label_events(IssueRef { project_id: 7, iid: 3 })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "workflow::qa");
    }

    #[tokio::test]
    async fn test_value_stream_stages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/graphql"))
            .and(body_partial_json(json!({ "variables": { "fullPath": "acme" } })))
            .and(body_partial_json(json!({ "variables": { "vsId": ["gid://vs/1"] } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "group": { "valueStreams": { "nodes": [ { "stages": { "nodes": [
                    { "name": "Lead Time", "metrics": { "median": { "value": 172800.0 } } },
                    { "name": "Cycle Time", "metrics": [ { "median": { "value": 86400.0 } } ] },
                    { "name": "Review", "metrics": { "median": null } }
                ] } } ] } } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/graphql"))
            .and(body_partial_json(json!({ "variables": { "fullPath": "acme" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "group": { "valueStreams": { "nodes": [ { "id": "gid://vs/1", "name": "Default" } ] } } }
            })))
            .mount(&server)
            .await;

        let window = DateWindow::new(
            start_of_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            start_of_day(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
        );
        let stages = client(&server)
            .value_stream_stages(&Scope::group("acme"), &window)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].median_seconds, Some(172800.0));
        assert_eq!(stages[1].median_seconds, Some(86400.0));
        assert_eq!(stages[2].median_seconds, None);
    }

    #[tokio::test]
    async fn test_no_value_stream_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "project": { "valueStreams": { "nodes": [] } } }
            })))
            .mount(&server)
            .await;

        let window = DateWindow::new(
            start_of_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            start_of_day(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
        );
        let stages = client(&server)
            .value_stream_stages(&Scope::project("acme/shop"), &window)
            .await
            .unwrap();
        assert!(stages.is_none());
    }

    #[tokio::test]
    async fn test_graphql_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [ { "message": "Field 'valueStreams' doesn't exist" } ]
            })))
            .mount(&server)
            .await;

        let window = DateWindow::new(
            start_of_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            start_of_day(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
        );
        let err = client(&server)
            .value_stream_stages(&Scope::group("acme"), &window)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GraphQl(ref m) if m.contains("valueStreams")));
    }
}
