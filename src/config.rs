//! Configuration file parser for ~/.config/lanefeed/config.toml.
//!
//! The config file is optional; a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::lanes::{DEFAULT_NARROW_BREAKPOINT, DEFAULT_WINDOW_SIZE};
use crate::provider::{TopicId, DEFAULT_PAGE_SIZE, DEFAULT_SEARCH_LIMIT};
use crate::search::{DEFAULT_DEBOUNCE, DEFAULT_MIN_QUERY_LEN};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is out of range.
    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// Every field has a default, so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the listing API.
    pub api_base_url: String,

    pub user_agent: String,

    /// Items requested per page.
    pub page_size: u32,

    /// Maximum topics returned by a search.
    pub search_limit: u32,

    pub request_timeout_secs: u64,

    /// Quiet period after the last keystroke before a search is sent.
    pub search_debounce_ms: u64,

    /// Trimmed queries shorter than this are never sent.
    pub min_query_len: usize,

    /// Lanes shown side by side on a wide viewport.
    pub lane_window: usize,

    /// Widths at or below this are laid out as narrow.
    pub narrow_breakpoint: u16,

    /// Lanes opened on first run, before anything has been persisted.
    pub default_topics: Vec<TopicId>,

    /// Where the lane list and settings are kept. Defaults to the platform
    /// data directory when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.reddit.com".to_string(),
            user_agent: concat!("lanefeed/", env!("CARGO_PKG_VERSION")).to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            search_limit: DEFAULT_SEARCH_LIMIT,
            request_timeout_secs: 20,
            search_debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            min_query_len: DEFAULT_MIN_QUERY_LEN,
            lane_window: DEFAULT_WINDOW_SIZE,
            narrow_breakpoint: DEFAULT_NARROW_BREAKPOINT,
            default_topics: vec![TopicId::from("programming"), TopicId::from("javascript")],
            data_dir: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "api_base_url",
        "user_agent",
        "page_size",
        "search_limit",
        "request_timeout_secs",
        "search_debounce_ms",
        "min_query_len",
        "lane_window",
        "narrow_breakpoint",
        "default_topics",
        "data_dir",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), base = %config.api_base_url, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the app misbehave rather than fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(invalid("page_size", "must be at least 1"));
        }
        if self.search_limit == 0 {
            return Err(invalid("search_limit", "must be at least 1"));
        }
        if self.lane_window == 0 {
            return Err(invalid("lane_window", "must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be at least 1"));
        }
        if self.default_topics.iter().any(|t| t.as_str().trim().is_empty()) {
            return Err(invalid("default_topics", "topic names cannot be empty"));
        }
        self.base_url()?;
        Ok(())
    }

    /// The parsed API base URL.
    ///
    /// Only https is accepted, except plain http to a loopback host.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| invalid("api_base_url", e.to_string()))?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if is_loopback(&url) => Ok(url),
            "http" => Err(invalid(
                "api_base_url",
                "plain http is only allowed for localhost",
            )),
            scheme => Err(invalid(
                "api_base_url",
                format!("unsupported scheme {scheme:?} (only http/https)"),
            )),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("lanefeed_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.lane_window, 3);
        assert_eq!(config.narrow_breakpoint, 768);
        assert_eq!(config.search_debounce(), Duration::from_millis(300));
        assert_eq!(config.default_topics, vec![TopicId::from("programming"), TopicId::from("javascript")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/lanefeed_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let config = Config::from_toml("page_size = 50\n").unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.lane_window, 3);
    }

    #[test]
    fn test_full_config() {
        let (dir, path) = write_config(
            "full",
            r#"
api_base_url = "http://127.0.0.1:8080"
user_agent = "test-agent/1.0"
page_size = 10
search_limit = 8
request_timeout_secs = 5
search_debounce_ms = 150
min_query_len = 3
lane_window = 4
narrow_breakpoint = 100
default_topics = ["rust", "golang"]
data_dir = "/var/tmp/lanefeed"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.base_url().unwrap().as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.user_agent, "test-agent/1.0");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.search_limit, 8);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.search_debounce_ms, 150);
        assert_eq!(config.min_query_len, 3);
        assert_eq!(config.lane_window, 4);
        assert_eq!(config.narrow_breakpoint, 100);
        assert_eq!(config.default_topics, vec![TopicId::from("rust"), TopicId::from("golang")]);
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/var/tmp/lanefeed")));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("page_size = \"lots\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("page_size = 30\ntotally_fake_key = 1\n").unwrap();
        assert_eq!(config.page_size, 30);
    }

    #[test]
    fn test_zero_values_rejected() {
        for (toml, key) in [
            ("page_size = 0", "page_size"),
            ("lane_window = 0", "lane_window"),
            ("search_limit = 0", "search_limit"),
            ("request_timeout_secs = 0", "request_timeout_secs"),
        ] {
            match Config::from_toml(toml) {
                Err(ConfigError::Invalid { key: k, .. }) => assert_eq!(k, key),
                other => panic!("expected Invalid for {toml}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_default_topic_rejected() {
        assert!(matches!(
            Config::from_toml("default_topics = [\"rust\", \" \"]"),
            Err(ConfigError::Invalid { key: "default_topics", .. })
        ));
    }

    #[test]
    fn test_base_url_scheme_rules() {
        let accepts = |u: &str| {
            Config {
                api_base_url: u.to_string(),
                ..Default::default()
            }
            .base_url()
            .is_ok()
        };
        assert!(accepts("https://www.reddit.com"));
        assert!(accepts("http://localhost:3000"));
        assert!(accepts("http://127.0.0.1:9999"));
        assert!(accepts("http://[::1]:9999"));
        assert!(!accepts("http://www.reddit.com"));
        assert!(!accepts("ftp://example.com"));
        assert!(!accepts("file:///etc/passwd"));
        assert!(!accepts("not a url"));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
