use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("GitLab API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("GitLab returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    UrlParse(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid window format: {0}")]
    WindowParse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures that came back from GitLab rather than from local input.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Api(_) | Error::Http { .. } | Error::GraphQl(_) | Error::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
