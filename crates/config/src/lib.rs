//! Configuration loading, validation, and management for parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Verbose logging
    #[serde(default)]
    pub debug: bool,

    /// Sampling and timeout settings for provider calls
    #[serde(default)]
    pub llm: LlmConfig,

    /// Orchestrator behavior
    #[serde(default)]
    pub agent: AgentConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// State persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4".into()
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
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("debug", &self.debug)
            .field("llm", &self.llm)
            .field("agent", &self.agent)
            .field("gateway", &self.gateway)
            .field("storage", &self.storage)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on a blocking completion call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on the wait for the next streamed fragment
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_request_timeout() -> u64 {
    120
}
fn default_idle_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Override the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Number of prior exchanges included in each prompt
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Record the concatenated fragments of a streamed turn as its response
    #[serde(default)]
    pub persist_streamed_responses: bool,
}

fn default_context_window() -> usize {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            context_window: default_context_window(),
            persist_streamed_responses: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Seconds between WebSocket pings on an idle connection
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// CORS origins. Empty = any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// If set, every request except `/health` must carry this key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_api_key_header() -> String {
    "X-API-Key".into()
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("allowed_origins", &self.allowed_origins)
            .field("api_key", &redact(&self.api_key))
            .field("api_key_header", &self.api_key_header)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            allowed_origins: vec![],
            api_key: None,
            api_key_header: default_api_key_header(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("storage")
}

impl StorageConfig {
    /// Location of the conversation snapshot.
    pub fn state_file(&self) -> PathBuf {
        self.path.join("state.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Register the unsandboxed `execute_code` tool
    #[serde(default)]
    pub allow_code_execution: bool,

    /// Interpreter used by `execute_code`
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_code_timeout")]
    pub code_timeout_secs: u64,
}

fn default_python() -> String {
    "python3".into()
}
fn default_code_timeout() -> u64 {
    10
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allow_code_execution: false,
            python: default_python(),
            code_timeout_secs: default_code_timeout(),
        }
    }
}

static GLOBAL: OnceLock<AppConfig> = OnceLock::new();

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// The process-wide configuration, resolved once.
    ///
    /// Falls back to defaults (plus environment overrides) if the config
    /// file cannot be loaded.
    pub fn global() -> &'static AppConfig {
        GLOBAL.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides(|key| std::env::var(key).ok());
                config
            })
        })
    }

    /// Make `config` the process-wide configuration.
    ///
    /// Only the first call (or the first [`AppConfig::global`]) takes
    /// effect; every caller gets the same cached instance back.
    pub fn install_global(config: AppConfig) -> &'static AppConfig {
        GLOBAL.get_or_init(|| config)
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

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Keys: `PARLEY_API_KEY` / `OPENAI_API_KEY`, `PARLEY_API_URL`,
    /// `PARLEY_MODEL` / `LLM_MODEL`, `DEBUG`, `WS_HEARTBEAT_INTERVAL`,
    /// `STORAGE_PATH`, `PARLEY_GATEWAY_KEY`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("PARLEY_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .filter(|k| !k.trim().is_empty());
        }

        if let Some(url) = lookup("PARLEY_API_URL") {
            self.api_url = url;
        }

        if let Some(model) = lookup("PARLEY_MODEL").or_else(|| lookup("LLM_MODEL")) {
            self.model = model;
        }

        if let Some(debug) = lookup("DEBUG") {
            self.debug = matches!(debug.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        if let Some(interval) = lookup("WS_HEARTBEAT_INTERVAL") {
            match interval.trim().parse() {
                Ok(secs) => self.gateway.heartbeat_interval_secs = secs,
                Err(_) => tracing::warn!(value = %interval, "Ignoring invalid WS_HEARTBEAT_INTERVAL"),
            }
        }

        if let Some(path) = lookup("STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }

        if let Some(key) = lookup("PARLEY_GATEWAY_KEY") {
            self.gateway.api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError("llm.max_tokens must be > 0".into()));
        }

        if self.llm.request_timeout_secs == 0 || self.llm.idle_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("llm timeouts must be > 0".into()));
        }

        if self.agent.context_window == 0 {
            return Err(ConfigError::ValidationError(
                "agent.context_window must be > 0".into(),
            ));
        }

        if self.tools.code_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.code_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            debug: false,
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
            tools: ToolsConfig::default(),
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
