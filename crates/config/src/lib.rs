//! Configuration loading, validation, and management for toolbridge.
//!
//! Loads configuration from `~/.toolbridge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.toolbridge/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning service settings
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool layer (discovery, health, invocation)
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Optional context retrieval service
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Chat API gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-3-haiku-20240307".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_reasoning_timeout() -> u64 {
    60
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_reasoning_timeout(),
        }
    }
}

impl std::fmt::Debug for ReasoningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum tool request/result cycles per round
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Wall-clock budget for a whole round
    #[serde(default = "default_round_timeout")]
    pub round_timeout_secs: u64,
}

fn default_system_prompt() -> String {
    concat!(
        "You are a business analysis assistant. Before claiming what tools you have ",
        "available, always refer to the tools you were actually given. The tool set is ",
        "dynamic: describe and use only what is in your tool list, and use the tools ",
        "to support your analysis."
    )
    .into()
}
fn default_max_tool_rounds() -> u32 {
    10
}
fn default_round_timeout() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tool_rounds: default_max_tool_rounds(),
            round_timeout_secs: default_round_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Base URL of the tool layer
    #[serde(default = "default_tools_url")]
    pub base_url: String,

    #[serde(default = "default_discovery_path")]
    pub discovery_path: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Per-call timeout for tool invocations
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_health_retries")]
    pub health_retries: u32,

    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    #[serde(default = "default_discovery_retries")]
    pub discovery_retries: u32,
}

fn default_tools_url() -> String {
    "http://tools:8000".into()
}
fn default_discovery_path() -> String {
    "/tools".into()
}
fn default_health_path() -> String {
    "/health".into()
}
fn default_tool_timeout() -> u64 {
    15
}
fn default_health_retries() -> u32 {
    5
}
fn default_health_interval() -> u64 {
    2
}
fn default_discovery_retries() -> u32 {
    3
}

impl ToolsConfig {
    pub fn discovery_url(&self) -> String {
        join_url(&self.base_url, &self.discovery_path)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_url: default_tools_url(),
            discovery_path: default_discovery_path(),
            health_path: default_health_path(),
            timeout_secs: default_tool_timeout(),
            health_retries: default_health_retries(),
            health_interval_secs: default_health_interval(),
            discovery_retries: default_discovery_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

fn default_top_k() -> usize {
    3
}
fn default_retrieval_timeout() -> u64 {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            top_k: default_top_k(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS. Empty = same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Whether `serve` waits for the tool layer before binding
    #[serde(default = "default_true")]
    pub wait_for_tools: bool,
}

fn default_port() -> u16 {
    8001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_sessions() -> usize {
    1_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: vec![],
            max_sessions: default_max_sessions(),
            wait_for_tools: true,
        }
    }
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolbridge/config.toml).
    ///
    /// Environment variables override the file:
    /// - `TOOLBRIDGE_API_KEY`, then `ANTHROPIC_API_KEY`
    /// - `TOOLBRIDGE_MODEL`
    /// - `TOOLBRIDGE_TOOLS_URL`
    /// - `TOOLBRIDGE_RETRIEVAL_URL` (also enables retrieval)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from a variable lookup (the environment in production).
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("TOOLBRIDGE_API_KEY").or_else(|| var("ANTHROPIC_API_KEY")) {
            self.reasoning.api_key = Some(key);
        }

        if let Some(model) = var("TOOLBRIDGE_MODEL") {
            self.reasoning.model = model;
        }

        if let Some(url) = var("TOOLBRIDGE_TOOLS_URL") {
            self.tools.base_url = url;
        }

        if let Some(url) = var("TOOLBRIDGE_RETRIEVAL_URL") {
            self.retrieval.url = Some(url);
            self.retrieval.enabled = true;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolbridge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.reasoning.temperature) {
            return Err(ConfigError::ValidationError(
                "reasoning.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_rounds must be at least 1".into(),
            ));
        }

        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.timeout_secs must be at least 1".into(),
            ));
        }

        if self.tools.timeout_secs >= self.agent.round_timeout_secs {
            return Err(ConfigError::ValidationError(format!(
                "tools.timeout_secs ({}) must be shorter than agent.round_timeout_secs ({})",
                self.tools.timeout_secs, self.agent.round_timeout_secs
            )));
        }

        if self.retrieval.enabled && self.retrieval.url.is_none() {
            return Err(ConfigError::ValidationError(
                "retrieval.enabled requires retrieval.url".into(),
            ));
        }

        Ok(())
    }

    /// Check if a reasoning API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.reasoning.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.reasoning.provider, "anthropic");
        assert_eq!(config.tools.timeout_secs, 15);
        assert_eq!(config.gateway.port, 8001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.reasoning.model, config.reasoning.model);
        assert_eq!(parsed.tools.base_url, config.tools.base_url);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.reasoning.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tool_timeout_must_fit_round_budget() {
        let mut config = AppConfig::default();
        config.tools.timeout_secs = 120;
        config.agent.round_timeout_secs = 120;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("round_timeout_secs"));
    }

    #[test]
    fn zero_tool_rounds_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_tool_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn retrieval_requires_url() {
        let mut config = AppConfig::default();
        config.retrieval.enabled = true;
        assert!(config.validate().is_err());
        config.retrieval.url = Some("http://rag:8002/search".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.reasoning.provider, "anthropic");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[tools]
base_url = "http://localhost:9000"
timeout_secs = 5

[agent]
max_tool_rounds = 4
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.tools.base_url, "http://localhost:9000");
        assert_eq!(config.tools.timeout_secs, 5);
        assert_eq!(config.tools.discovery_path, "/tools");
        assert_eq!(config.agent.max_tool_rounds, 4);
        assert_eq!(config.reasoning.max_tokens, 1024);
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tools\nbase_url = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn overrides_apply_in_priority_order() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "sk-ant-fallback"),
            ("TOOLBRIDGE_API_KEY", "sk-primary"),
            ("TOOLBRIDGE_TOOLS_URL", "http://localhost:8000"),
            ("TOOLBRIDGE_RETRIEVAL_URL", "http://localhost:8002/search"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.reasoning.api_key.as_deref(), Some("sk-primary"));
        assert_eq!(config.tools.base_url, "http://localhost:8000");
        assert!(config.retrieval.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_key_wins_over_configured_key() {
        let mut config = AppConfig::default();
        config.reasoning.api_key = Some("sk-file".into());
        config.apply_overrides(|k| (k == "ANTHROPIC_API_KEY").then(|| "sk-env".to_string()));
        assert_eq!(config.reasoning.api_key.as_deref(), Some("sk-env"));

        let mut config = AppConfig::default();
        config.reasoning.api_key = Some("sk-file".into());
        config.apply_overrides(|_| None);
        assert_eq!(config.reasoning.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.reasoning.api_key = Some("sk-ant-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn urls_are_joined_cleanly() {
        let tools = ToolsConfig {
            base_url: "http://tools:8000/".into(),
            ..ToolsConfig::default()
        };
        assert_eq!(tools.discovery_url(), "http://tools:8000/tools");
        assert_eq!(tools.health_url(), "http://tools:8000/health");
        assert_eq!(join_url("http://a", "b"), "http://a/b");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("anthropic"));
        assert!(toml_str.contains("http://tools:8000"));
        assert!(!toml_str.contains("api_key"));
    }
}
