//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/dendrite/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/dendrite/` (~/.config/dendrite/)
//! - Data: `$XDG_DATA_HOME/dendrite/` (~/.local/share/dendrite/)
//! - State/Logs: `$XDG_STATE_HOME/dendrite/` (~/.local/state/dendrite/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tool backend configuration
    #[serde(default)]
    pub tools: ToolBackendConfig,

    /// Title generation configuration (optional)
    #[serde(default)]
    pub titles: Option<TitleConfig>,

    /// Pagination defaults
    #[serde(default)]
    pub paging: PagingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the external capability backends tools dispatch to.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolBackendConfig {
    /// Base URL of the knowledge/simulation backend
    /// (e.g., `https://api.example.org/v1`)
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Bearer token for the backend (can also come from env)
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Default for ToolBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_key: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl ToolBackendConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("tools.base_url must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "tools.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tool_timeout() -> u64 {
    30
}

/// Title generation configuration.
///
/// When present, thread titles are derived by an external completion
/// endpoint; otherwise a deterministic truncation of the first user
/// message is used.
#[derive(Debug, Deserialize, Clone)]
pub struct TitleConfig {
    /// Completion endpoint URL
    pub endpoint: String,
    /// Model identifier passed to the endpoint
    pub model: String,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_title_timeout")]
    pub timeout_secs: u64,
}

fn default_title_timeout() -> u64 {
    15
}

/// Pagination defaults for thread and message listings
#[derive(Debug, Deserialize, Clone)]
pub struct PagingConfig {
    /// Default page size for message pages
    #[serde(default = "default_message_page_size")]
    pub message_page_size: usize,

    /// Default page size for thread pages
    #[serde(default = "default_thread_page_size")]
    pub thread_page_size: usize,

    /// Default result limit for search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            message_page_size: default_message_page_size(),
            thread_page_size: default_thread_page_size(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_message_page_size() -> usize {
    25
}

fn default_thread_page_size() -> usize {
    20
}

fn default_search_limit() -> usize {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.tools.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/dendrite/config.toml` (~/.config/dendrite/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("dendrite").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/dendrite/` (~/.local/share/dendrite/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("dendrite")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/dendrite/` (~/.local/state/dendrite/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("dendrite")
    }

    /// Returns the database file path
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("threads.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("dendrite.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.titles.is_none());
        assert_eq!(config.paging.message_page_size, 25);
        assert_eq!(config.paging.thread_page_size, 20);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[tools]
base_url = "https://kg.example.org/api"
timeout_secs = 10

[titles]
endpoint = "https://llm.example.org/v1/completions"
model = "title-sm"

[paging]
message_page_size = 50

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.tools.base_url, "https://kg.example.org/api");
        assert_eq!(config.tools.timeout_secs, 10);
        let titles = config.titles.unwrap();
        assert_eq!(titles.model, "title-sm");
        assert_eq!(config.paging.message_page_size, 50);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_tool_backend_validation() {
        let config = ToolBackendConfig::default();
        assert!(config.validate().is_ok());

        let config = ToolBackendConfig {
            base_url: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ToolBackendConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
