//! Configuration loading, validation, and management for Roomcast.
//!
//! Loads configuration from `~/.roomcast/config.toml` with environment
//! variable overrides. Validates all settings at startup. The loaded
//! [`AppConfig`] is passed explicitly to the agent; nothing below the
//! binary reads the process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.roomcast/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Web search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Turn pipeline settings
    #[serde(default)]
    pub agent: AgentSettings,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Bearer credential for the chat-completions endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional cap on generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Bearer credential for the search API. Search is disabled without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// "basic" or "advanced"
    #[serde(default = "default_search_depth")]
    pub search_depth: String,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default = "default_true")]
    pub include_answer: bool,

    #[serde(default)]
    pub include_raw_content: bool,
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".into()
}
fn default_search_depth() -> String {
    "advanced".into()
}
fn default_max_results() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_search_endpoint(),
            search_depth: default_search_depth(),
            max_results: default_max_results(),
            include_answer: true,
            include_raw_content: false,
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("search_depth", &self.search_depth)
            .field("max_results", &self.max_results)
            .field("include_answer", &self.include_answer)
            .field("include_raw_content", &self.include_raw_content)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Display name used in the system prompt
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Transcript capacity, system turn included
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Minimum gap between partial message updates while streaming
    #[serde(default = "default_partial_update_interval_ms")]
    pub partial_update_interval_ms: u64,

    /// Upper bound on a single generation (request + stream)
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Replaces the built-in system prompt. `{date}` is substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_agent_name() -> String {
    "Roomcast".into()
}
fn default_max_turns() -> usize {
    20
}
fn default_partial_update_interval_ms() -> u64 {
    1000
}
fn default_generation_timeout_secs() -> u64 {
    120
}

impl AgentSettings {
    pub fn partial_update_interval(&self) -> Duration {
        Duration::from_millis(self.partial_update_interval_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_turns: default_max_turns(),
            partial_update_interval_ms: default_partial_update_interval_ms(),
            generation_timeout_secs: default_generation_timeout_secs(),
            system_prompt_override: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.roomcast/config.toml).
    ///
    /// Also checks environment variables:
    /// - `ROOMCAST_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    /// - `ROOMCAST_BASE_URL`, `ROOMCAST_MODEL`
    /// - `TAVILY_API_KEY`
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

    /// Apply overrides from an environment lookup.
    ///
    /// Credentials from the file win over the environment; endpoint and
    /// model overrides always apply.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("ROOMCAST_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"))
                .filter(|k| !k.trim().is_empty());
        }

        if let Some(base_url) = lookup("ROOMCAST_BASE_URL") {
            self.llm.base_url = base_url;
        }

        if let Some(model) = lookup("ROOMCAST_MODEL") {
            self.llm.model = model;
        }

        if self.search.api_key.is_none() {
            self.search.api_key = lookup("TAVILY_API_KEY").filter(|k| !k.trim().is_empty());
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".roomcast")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_turns < 2 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must leave room for the system turn and one message".into(),
            ));
        }

        if self.agent.generation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.generation_timeout_secs must be at least 1".into(),
            ));
        }

        if self.search.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an LLM credential is available.
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string (for `roomcast config --default`).
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
