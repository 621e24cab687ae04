use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::parse_label_list;

pub const DEFAULT_URL: &str = "https://gitlab.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Connection settings for a [`crate::source::GitlabClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitlabConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub per_page: u32,
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl GitlabConfig {
    /// Read `GITLAB_URL` and `GITLAB_TOKEN`. Missing or blank values keep the
    /// defaults (gitlab.com, anonymous).
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("GITLAB_URL").ok(),
            std::env::var("GITLAB_TOKEN").ok(),
        )
    }

    fn from_vars(url: Option<String>, token: Option<String>) -> Self {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let mut config = Self::default();
        if let Some(url) = non_blank(url) {
            config.url = url.trim_end_matches('/').to_string();
        }
        config.token = non_blank(token);
        config
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, 100);
        self
    }
}

/// Defaults that would otherwise be repeated on every command line.
///
/// Stored as JSON at `~/.gitlab-insights/config.json`:
///
/// ```json
/// {
///   "qa_labels": ["bug::qa"],
///   "prod_labels": ["bug::production"],
///   "stages": { "Dev": "workflow::in-dev", "QA": "workflow::qa, workflow::qa-scoping" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gitlab_url: Option<String>,
    pub qa_labels: Vec<String>,
    pub prod_labels: Vec<String>,
    /// Stage name → comma-separated labels.
    pub stages: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    pub per_page: Option<u32>,
}

impl Settings {
    /// Path of the default settings file, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".gitlab-insights").join("config.json"))
    }

    /// Load the default settings file. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => {
                log::debug!("No home directory; using default settings");
                Ok(Self::default())
            }
        }
    }

    /// Load settings from `path`. A missing file yields defaults; a file that
    /// exists but does not parse is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("Settings file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid settings in {}: {e}", path.display())))
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| Error::Config(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Stage map with each stage's labels split out.
    pub fn stage_map(&self) -> BTreeMap<String, Vec<String>> {
        self.stages
            .iter()
            .map(|(stage, labels)| (stage.clone(), parse_label_list(labels)))
            .collect()
    }

    /// Layer these settings under an env-derived config: values already set
    /// in the environment win.
    pub fn apply_to(&self, mut config: GitlabConfig, url_from_env: bool) -> GitlabConfig {
        if !url_from_env {
            if let Some(ref url) = self.gitlab_url {
                config = config.with_url(url.clone());
            }
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(secs);
        }
        if let Some(per_page) = self.per_page {
            config = config.with_per_page(per_page);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = GitlabConfig::from_vars(None, Some("  ".into()));
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.token, None);
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_from_vars_trims_trailing_slash() {
        let config = GitlabConfig::from_vars(
            Some("https://gitlab.example.com/".into()),
            Some("glpat-abc".into()),
        );
        assert_eq!(config.url, "https://gitlab.example.com");
        assert_eq!(config.token.as_deref(), Some("glpat-abc"));
    }

    #[test]
    fn test_per_page_is_clamped() {
        assert_eq!(GitlabConfig::default().with_per_page(500).per_page, 100);
        assert_eq!(GitlabConfig::default().with_per_page(0).per_page, 1);
    }

    #[test]
    fn test_settings_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut settings = Settings {
            qa_labels: vec!["bug::qa".into()],
            prod_labels: vec!["bug::production".into()],
            ..Settings::default()
        };
        settings
            .stages
            .insert("QA".into(), "workflow::qa, workflow::qa-scoping".into());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(
            loaded.stage_map()["QA"],
            vec!["workflow::qa".to_string(), "workflow::qa-scoping".to_string()]
        );
    }

    #[test]
    fn test_settings_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_apply_to_env_url_wins() {
        let settings = Settings {
            gitlab_url: Some("https://settings.example.com".into()),
            timeout_secs: Some(30),
            ..Settings::default()
        };
        let env = GitlabConfig::default().with_url("https://env.example.com");
        let config = settings.apply_to(env.clone(), true);
        assert_eq!(config.url, "https://env.example.com");
        assert_eq!(config.timeout_secs, 30);

        let config = settings.apply_to(GitlabConfig::default(), false);
        assert_eq!(config.url, "https://settings.example.com");
    }
}
