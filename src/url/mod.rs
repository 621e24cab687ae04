use crate::error::{Error, Result};
use crate::model::{Scope, ScopeKind};

/// What a GitLab web URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitlabUrlInfo {
    /// A group or project page; which one cannot be told from the URL alone.
    Namespace { path: String },
    Issue { project_path: String, iid: u64 },
    Epic { group_path: String, iid: u64 },
}

impl GitlabUrlInfo {
    /// Path of the group or project the URL lives under.
    pub fn namespace_path(&self) -> &str {
        match self {
            GitlabUrlInfo::Namespace { path } => path,
            GitlabUrlInfo::Issue { project_path, .. } => project_path,
            GitlabUrlInfo::Epic { group_path, .. } => group_path,
        }
    }
}

/// Parse a GitLab web URL. Any host is accepted, since GitLab is often
/// self-hosted.
///
/// Supported URL patterns:
/// - `https://<host>/<namespace...>` and anything under `/-/` that is not
///   listed below (milestones, boards, ...)
/// - `https://<host>/groups/<namespace...>/-/...`
/// - `https://<host>/<project...>/-/issues/<iid>`
/// - `https://<host>/groups/<group...>/-/epics/<iid>`
pub fn parse_gitlab_url(input: &str) -> Result<GitlabUrlInfo> {
    let url = url::Url::parse(input).map_err(|e| Error::UrlParse(format!("{input}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::UrlParse(format!("not a web URL: {input}")));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    // Everything after `/-/` is a resource inside the namespace.
    let split = segments.iter().position(|s| *s == "-");
    let (mut namespace, resource) = match split {
        Some(i) => (&segments[..i], &segments[i + 1..]),
        None => (&segments[..], &[][..]),
    };
    if namespace.first() == Some(&"groups") {
        namespace = &namespace[1..];
    }
    if namespace.is_empty() {
        return Err(Error::UrlParse(format!("no group or project in URL: {input}")));
    }
    let path = namespace.join("/");

    match resource {
        ["issues", iid, ..] => Ok(GitlabUrlInfo::Issue {
            project_path: path,
            iid: parse_iid(iid, input)?,
        }),
        ["epics", iid, ..] => Ok(GitlabUrlInfo::Epic {
            group_path: path,
            iid: parse_iid(iid, input)?,
        }),
        _ => Ok(GitlabUrlInfo::Namespace { path }),
    }
}

fn parse_iid(s: &str, input: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| Error::UrlParse(format!("expected a numeric IID in URL: {input}")))
}

/// Check if a string is a numeric GitLab id.
pub fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Build a scope from a numeric id, a full path (`group/sub/project`) or a
/// GitLab URL.
pub fn resolve_scope(kind: ScopeKind, input: &str) -> Result<Scope> {
    let input = input.trim();
    let id = if is_numeric_id(input) {
        input.to_string()
    } else if input.starts_with("http://") || input.starts_with("https://") {
        parse_gitlab_url(input)?.namespace_path().to_string()
    } else {
        let path = input.trim_matches('/');
        if path.is_empty() || path.contains(char::is_whitespace) {
            return Err(Error::InvalidIdentifier(format!(
                "expected a {} id, path or URL, got '{input}'",
                kind.as_str()
            )));
        }
        path.to_string()
    };
    Ok(Scope { kind, id })
}

/// Resolve an epic given either its IID (with the group supplied
/// separately) or an epic URL, which carries both.
pub fn resolve_epic(group: Option<&str>, epic: &str) -> Result<(Scope, u64)> {
    let epic = epic.trim();
    if let Ok(iid) = epic.trim_start_matches('&').parse::<u64>() {
        let group = group.ok_or_else(|| {
            Error::InvalidIdentifier("an epic IID needs a group (--group)".into())
        })?;
        return Ok((resolve_scope(ScopeKind::Group, group)?, iid));
    }
    match parse_gitlab_url(epic)? {
        GitlabUrlInfo::Epic { group_path, iid } => Ok((Scope::group(group_path), iid)),
        other => Err(Error::UrlParse(format!(
            "not an epic URL: {epic} (points at {})",
            other.namespace_path()
        ))),
    }
}
