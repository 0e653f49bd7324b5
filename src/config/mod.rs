use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::{IndexError, Result};

/// Default bound on a single Graph API fetch
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which adapter(s) feed the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    #[default]
    Filesystem,
    GraphApi,
    Hybrid,
}

impl SourceMode {
    pub fn uses_filesystem(self) -> bool {
        matches!(self, SourceMode::Filesystem | SourceMode::Hybrid)
    }

    pub fn uses_graph_api(self) -> bool {
        matches!(self, SourceMode::GraphApi | SourceMode::Hybrid)
    }
}

impl FromStr for SourceMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filesystem" => Ok(SourceMode::Filesystem),
            "graphapi" => Ok(SourceMode::GraphApi),
            "hybrid" => Ok(SourceMode::Hybrid),
            other => Err(IndexError::ConfigInconsistency(format!(
                "unknown source mode '{}' (expected filesystem, graphapi or hybrid)",
                other
            ))),
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Filesystem => f.write_str("filesystem"),
            SourceMode::GraphApi => f.write_str("graphapi"),
            SourceMode::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Unvalidated settings as they arrive from the command line or environment
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub source_mode: Option<String>,
    pub graph_api_url: Option<String>,
    pub codex_path: Option<String>,
    pub project_codes: Option<String>,
    pub graph_api_token: Option<String>,
    pub request_timeout: Option<Duration>,
}

/// Process-wide configuration, validated once at startup
#[derive(Debug, Clone)]
pub struct BrainbaseConfig {
    pub source_mode: SourceMode,
    pub graph_api_url: Option<Url>,
    pub codex_path: Option<PathBuf>,
    pub project_codes: Vec<String>,
    pub graph_api_token: Option<String>,
    pub request_timeout: Duration,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma-separated list, trimming entries and dropping blanks
pub fn parse_project_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

impl BrainbaseConfig {
    /// Validate raw settings; any mode/setting mismatch is a `ConfigInconsistency`
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let source_mode = match non_blank(raw.source_mode) {
            Some(mode) => mode.parse()?,
            None => SourceMode::default(),
        };

        let graph_api_url = non_blank(raw.graph_api_url)
            .map(|url| {
                Url::parse(&url).map_err(|e| {
                    IndexError::ConfigInconsistency(format!(
                        "invalid Graph API URL '{}': {}",
                        url, e
                    ))
                })
            })
            .transpose()?;
        let codex_path = non_blank(raw.codex_path).map(PathBuf::from);

        if source_mode.uses_graph_api() && graph_api_url.is_none() {
            return Err(IndexError::ConfigInconsistency(format!(
                "BRAINBASE_GRAPH_API_URL is required for {} mode",
                source_mode
            )));
        }
        if source_mode.uses_filesystem() && codex_path.is_none() {
            return Err(IndexError::ConfigInconsistency(format!(
                "CODEX_PATH is required for {} mode",
                source_mode
            )));
        }

        let project_codes = raw
            .project_codes
            .as_deref()
            .map(parse_project_codes)
            .unwrap_or_default();

        Ok(Self {
            source_mode,
            graph_api_url,
            codex_path,
            project_codes,
            graph_api_token: non_blank(raw.graph_api_token),
            request_timeout: raw.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }

    /// Configuration for a filesystem-only index rooted at `codex_path`
    pub fn filesystem(codex_path: impl Into<PathBuf>) -> Self {
        Self {
            source_mode: SourceMode::Filesystem,
            graph_api_url: None,
            codex_path: Some(codex_path.into()),
            project_codes: Vec::new(),
            graph_api_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(mode: &str, url: Option<&str>, path: Option<&str>) -> RawConfig {
        RawConfig {
            source_mode: Some(mode.to_string()),
            graph_api_url: url.map(str::to_string),
            codex_path: path.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_filesystem_mode_requires_codex_path() {
        let err = BrainbaseConfig::from_raw(raw("filesystem", None, None)).unwrap_err();
        assert!(matches!(err, IndexError::ConfigInconsistency(_)));

        let config = BrainbaseConfig::from_raw(raw("filesystem", None, Some("/codex"))).unwrap();
        assert_eq!(config.source_mode, SourceMode::Filesystem);
        assert_eq!(config.codex_path, Some(PathBuf::from("/codex")));
    }

    #[test]
    fn test_graphapi_mode_requires_url() {
        let err = BrainbaseConfig::from_raw(raw("graphapi", None, Some("/codex"))).unwrap_err();
        assert!(matches!(err, IndexError::ConfigInconsistency(_)));

        let config =
            BrainbaseConfig::from_raw(raw("graphapi", Some("https://graph.example.com"), None))
                .unwrap();
        assert_eq!(config.source_mode, SourceMode::GraphApi);
        assert!(config.codex_path.is_none());
    }

    #[test]
    fn test_hybrid_mode_requires_both() {
        assert!(BrainbaseConfig::from_raw(raw("hybrid", Some("https://g.example"), None)).is_err());
        assert!(BrainbaseConfig::from_raw(raw("hybrid", None, Some("/codex"))).is_err());
        assert!(BrainbaseConfig::from_raw(raw("hybrid", Some("https://g.example"), Some("/codex"))).is_ok());
    }

    #[test]
    fn test_blank_values_count_as_absent() {
        let err = BrainbaseConfig::from_raw(raw("graphapi", Some("   "), None)).unwrap_err();
        assert!(matches!(err, IndexError::ConfigInconsistency(_)));
    }

    #[test]
    fn test_invalid_url_and_mode_rejected() {
        assert!(BrainbaseConfig::from_raw(raw("graphapi", Some("not a url"), None)).is_err());
        assert!(BrainbaseConfig::from_raw(raw("sqlite", None, Some("/codex"))).is_err());
    }

    #[test]
    fn test_default_mode_is_filesystem() {
        let config = BrainbaseConfig::from_raw(RawConfig {
            codex_path: Some("/codex".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.source_mode, SourceMode::Filesystem);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_project_codes_parsing() {
        assert_eq!(parse_project_codes("zep, mana,,  brainbase "), vec!["zep", "mana", "brainbase"]);
        assert!(parse_project_codes(" , ").is_empty());

        let mut input = raw("graphapi", Some("https://g.example"), None);
        input.project_codes = Some("b,a".to_string());
        let config = BrainbaseConfig::from_raw(input).unwrap();
        assert_eq!(config.project_codes, vec!["b", "a"]);
    }
}
