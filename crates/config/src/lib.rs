//! Configuration loading, validation, and management for MoltyClaw.
//!
//! Loads configuration from `~/.moltyclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.moltyclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Primary LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Provider tried when the primary one is exhausted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider retry and timeout policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Turn loop and compaction settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Memory file locations
    #[serde(default)]
    pub memory: MemoryConfig,

    /// CMD action settings
    #[serde(default)]
    pub shell: ShellConfig,

    /// Which outbound message actions are enabled
    #[serde(default)]
    pub outbound: OutboundConfig,

    /// Tokens for outbound message actions
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "mistral".into()
}
fn default_model() -> String {
    "mistral-large-latest".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
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
            .field("default_provider", &self.default_provider)
            .field("fallback_provider", &self.fallback_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("retry", &self.retry)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("shell", &self.shell)
            .field("outbound", &self.outbound)
            .field("credentials", &self.credentials)
            .field("providers", &self.providers)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// How provider calls are retried and bounded in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per provider call, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles each time after that
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Bound on opening a stream (connect + first response headers)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bound on silence between two stream chunks
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_idle_timeout_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Agent display name, used in the system turn
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Conversation size (chars) above which compaction runs
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold_chars: usize,

    /// Turns kept after compaction, not counting system and pending turns
    #[serde(default = "default_keep_recent_turns")]
    pub keep_recent_turns: usize,

    /// Length cap for kept action-result turns after compaction
    #[serde(default = "default_truncated_result_chars")]
    pub truncated_result_chars: usize,

    /// How much of long-term memory goes into the system turn
    #[serde(default = "default_long_term_excerpt_chars")]
    pub long_term_excerpt_chars: usize,

    /// Bound on a whole ask (0 disables)
    #[serde(default = "default_ask_timeout_secs")]
    pub ask_timeout_secs: u64,
}

fn default_agent_name() -> String {
    "MoltyClaw".into()
}
fn default_compaction_threshold() -> usize {
    15_000
}
fn default_keep_recent_turns() -> usize {
    4
}
fn default_truncated_result_chars() -> usize {
    1000
}
fn default_long_term_excerpt_chars() -> usize {
    2000
}
fn default_ask_timeout_secs() -> u64 {
    600
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            compaction_threshold_chars: default_compaction_threshold(),
            keep_recent_turns: default_keep_recent_turns(),
            truncated_result_chars: default_truncated_result_chars(),
            long_term_excerpt_chars: default_long_term_excerpt_chars(),
            ask_timeout_secs: default_ask_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding every memory file (default: ~/.moltyclaw/workspace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(default = "default_long_term_file")]
    pub long_term_file: String,

    #[serde(default = "default_persona_file")]
    pub persona_file: String,

    /// Subdirectory for dated journals
    #[serde(default = "default_daily_dir")]
    pub daily_dir: String,
}

fn default_long_term_file() -> String {
    "MEMORY.md".into()
}
fn default_persona_file() -> String {
    "SOUL.md".into()
}
fn default_daily_dir() -> String {
    "memory".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            root: None,
            long_term_file: default_long_term_file(),
            persona_file: default_persona_file(),
            daily_dir: default_daily_dir(),
        }
    }
}

impl MemoryConfig {
    /// The configured root, or the default workspace directory.
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(AppConfig::workspace_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Program names CMD may run. Empty = allow all.
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_shell_timeout")]
    pub timeout_secs: u64,
}

fn default_shell_timeout() -> u64 {
    60
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            allowed_commands: vec![],
            timeout_secs: default_shell_timeout(),
        }
    }
}

/// Outbound message actions. Disabled actions are not registered at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundConfig {
    #[serde(default)]
    pub whatsapp: bool,

    #[serde(default)]
    pub discord: bool,

    #[serde(default)]
    pub telegram: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_token: Option<String>,

    /// Local WhatsApp bridge base URL
    #[serde(default = "default_whatsapp_bridge_url")]
    pub whatsapp_bridge_url: String,
}

fn default_whatsapp_bridge_url() -> String {
    "http://localhost:8081".into()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            discord_token: None,
            whatsapp_bridge_url: default_whatsapp_bridge_url(),
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("telegram_token", &redact(&self.telegram_token))
            .field("discord_token", &redact(&self.discord_token))
            .field("whatsapp_bridge_url", &self.whatsapp_bridge_url)
            .finish()
    }
}

/// Parse an on/off environment flag. Unrecognized values are ignored.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.moltyclaw/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `MOLTYCLAW_API_KEY` (highest priority)
    /// - `MISTRAL_API_KEY`
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("MOLTYCLAW_API_KEY")
                .or_else(|| lookup("MISTRAL_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            let entry = self.providers.entry("anthropic".into()).or_default();
            if entry.api_key.is_none() {
                entry.api_key = Some(key);
            }
        }

        if let Some(provider) = lookup("MOLTYCLAW_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(fallback) = lookup("MOLTYCLAW_FALLBACK_PROVIDER") {
            self.fallback_provider = Some(fallback);
        }
        if let Some(model) = lookup("MOLTYCLAW_MODEL") {
            self.default_model = model;
        }

        if let Some(flag) = lookup("MOLTY_WHATSAPP_ACTIVE").as_deref().and_then(parse_flag) {
            self.outbound.whatsapp = flag;
        }
        if let Some(flag) = lookup("MOLTY_DISCORD_ACTIVE").as_deref().and_then(parse_flag) {
            self.outbound.discord = flag;
        }
        if let Some(flag) = lookup("MOLTY_TELEGRAM_ACTIVE").as_deref().and_then(parse_flag) {
            self.outbound.telegram = flag;
        }

        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.credentials.telegram_token = Some(token);
        }
        if let Some(token) = lookup("DISCORD_TOKEN") {
            self.credentials.discord_token = Some(token);
        }
        if let Some(url) = lookup("WHATSAPP_BRIDGE_URL") {
            self.credentials.whatsapp_bridge_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".moltyclaw")
    }

    /// Get the workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.agent.keep_recent_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.keep_recent_turns must be at least 1".into(),
            ));
        }

        if self.fallback_provider.as_deref() == Some(self.default_provider.as_str()) {
            return Err(ConfigError::ValidationError(
                "fallback_provider must differ from default_provider".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            fallback_provider: None,
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            retry: RetryConfig::default(),
            agent: AgentSettings::default(),
            memory: MemoryConfig::default(),
            shell: ShellConfig::default(),
            outbound: OutboundConfig::default(),
            credentials: CredentialsConfig::default(),
            providers: HashMap::new(),
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
