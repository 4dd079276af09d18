//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/afterpaths/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/afterpaths/` (~/.config/afterpaths/)
//! - Data: `$XDG_DATA_HOME/afterpaths/` (~/.local/share/afterpaths/)
//! - State/Logs: `$XDG_STATE_HOME/afterpaths/` (~/.local/state/afterpaths/)

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
    /// LLM configuration for summarization and extraction (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Adapter path overrides
    #[serde(default)]
    pub adapters: AdapterOverrides,

    /// Extraction behavior
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: usize,
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com",
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_llm_max_retries() -> usize {
    3
}

/// Override paths for transcript directories
#[derive(Debug, Deserialize, Default)]
pub struct AdapterOverrides {
    /// Override path for Claude Code data (~/.claude)
    pub claude_code_path: Option<PathBuf>,
    /// Override path for Cursor workspace storage
    pub cursor_path: Option<PathBuf>,
}

/// Rule extraction configuration
#[derive(Debug, Deserialize)]
pub struct ExtractionConfig {
    /// Max unconsumed summaries per extractor call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Only consider summaries from the last N days (0 = no limit)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_lookback_days() -> u32 {
    14
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

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.extraction.batch_size == 0 {
            return Err(Error::Config(
                "extraction.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/afterpaths/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("afterpaths").join("config.toml")
    }

    /// Returns the data directory path (session index, summaries, rules)
    ///
    /// `$XDG_DATA_HOME/afterpaths/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("afterpaths")
    }

    /// Returns the state directory path (logs, pipeline lock)
    ///
    /// `$XDG_STATE_HOME/afterpaths/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("afterpaths")
    }

    /// Returns the session index database path
    pub fn index_path() -> PathBuf {
        Self::data_dir().join("index.db")
    }

    /// Returns the summary artifact directory
    pub fn summaries_dir() -> PathBuf {
        Self::data_dir().join("summaries")
    }

    /// Returns the rule document directory
    pub fn rules_dir() -> PathBuf {
        Self::data_dir().join("rules")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("afterpaths.log")
    }
}
