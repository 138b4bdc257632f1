//! Configuration loading, validation, and management for salesdesk.
//!
//! Loads configuration from `~/.salesdesk/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.salesdesk/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM endpoint and sampling settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Document store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Turn loop and pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("llm", &self.llm)
            .field("store", &self.store)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (".../v1")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Per-call timeout for completions
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Send tool schemas with each request. The server must support
    /// OpenAI-style tool calling; otherwise calls are read from text.
    #[serde(default)]
    pub native_tools: bool,
}

fn default_api_url() -> String {
    "http://localhost:8000/v1".into()
}
fn default_model() -> String {
    "Qwen/Qwen3-8B".into()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_top_p() -> f32 {
    0.95
}
fn default_seed() -> u64 {
    42
}
fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            seed: default_seed(),
            timeout_secs: default_llm_timeout(),
            native_tools: false,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which store backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// SQLite file path (sqlite backend only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Insert the demo catalog when the store opens
    #[serde(default = "default_true")]
    pub seed_on_start: bool,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
            seed_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bounded attempts for provider calls, upstream calls, and failed dispatches
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt timeout for store operations
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Backoff before retry n is `backoff_base_ms * 2^n`
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Language of the final customer reply
    #[serde(default = "default_reply_language")]
    pub reply_language: String,

    /// Ask the model to summarise a tool result (true) or end the stage on it
    #[serde(default = "default_true")]
    pub incorporate_tool_results: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_tool_timeout() -> u64 {
    15
}
fn default_backoff_base() -> u64 {
    1000
}
fn default_reply_language() -> String {
    "Vietnamese".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            tool_timeout_secs: default_tool_timeout(),
            backoff_base_ms: default_backoff_base(),
            reply_language: default_reply_language(),
            incorporate_tool_results: true,
        }
    }
}

impl PipelineConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.salesdesk/config.toml).
    ///
    /// Environment variables override the file:
    /// - `SALESDESK_API_KEY`, then `API_KEY`, then `OPENAI_API_KEY`
    /// - `API_URL`, `LLM_MODEL`
    /// - `SALESDESK_STORE_PATH` (also switches the backend to sqlite)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path, |key| std::env::var(key).ok())
    }

    /// Load from `path`, then apply overrides from `env`.
    pub fn load_with_env(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let key = env("SALESDESK_API_KEY")
            .or_else(|| env("API_KEY"))
            .or_else(|| env("OPENAI_API_KEY"));
        if key.is_some() {
            self.api_key = key;
        }

        if let Some(url) = env("API_URL") {
            self.llm.api_url = url;
        }

        if let Some(model) = env("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(path) = env("SALESDESK_STORE_PATH") {
            self.store.backend = StoreBackend::Sqlite;
            self.store.path = Some(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".salesdesk")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.top_p <= 0.0 || self.llm.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "llm.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.llm.timeout_secs == 0 || self.pipeline.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }

        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_attempts must be at least 1".into(),
            ));
        }

        if self.store.backend == StoreBackend::Sqlite
            && self.store.path.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::ValidationError(
                "store.path is required for the sqlite backend".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            llm: LlmConfig::default(),
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
