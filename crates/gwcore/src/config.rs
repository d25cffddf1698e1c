use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

fn default_workers() -> usize {
    10
}
fn default_inbox_capacity() -> usize {
    256
}
fn default_max_idle_secs() -> u64 {
    30 * 60
}
fn default_max_sessions() -> usize {
    0
}
fn default_max_history_len() -> usize {
    100
}
fn default_poll_timeout_secs() -> u64 {
    30
}
fn default_env_filter() -> String {
    "info".to_string()
}

/// Router tunables, mapped directly onto the defaults the router façade
/// applies at construction time when a field is left unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
    /// 0 means uncapped.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_max_history_len")]
    pub max_history_len: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            inbox_capacity: default_inbox_capacity(),
            max_idle_secs: default_max_idle_secs(),
            max_sessions: default_max_sessions(),
            max_history_len: default_max_history_len(),
        }
    }
}

/// Telegram long-poll reference adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default)]
    pub allow_users: Vec<String>,
    #[serde(default)]
    pub allow_groups: Vec<String>,
    #[serde(default)]
    pub require_mention: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_env_filter")]
    pub env_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { env_filter: default_env_filter() }
    }
}

/// Top-level gateway configuration (`gateway.toml` + `GATEWAY_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub router: RouterConfig,
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Loads config from a TOML file with `GATEWAY_`-prefixed env var overrides.
    ///
    /// Path resolution order: explicit `path` argument, then the
    /// `GATEWAY_CONFIG` env var, then `~/.gateway/gateway.toml`. A missing
    /// file is not fatal — defaults apply and a warning is logged.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let resolved = path
            .map(String::from)
            .or_else(|| std::env::var("GATEWAY_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        if !Path::new(&resolved).exists() {
            tracing::warn!(path = %resolved, "config file not found, using defaults");
        }

        Figment::new()
            .merge(Toml::file(&resolved))
            .merge(Env::prefixed("GATEWAY_").split("_"))
            .extract()
            .map_err(|source| ConfigError::Load { path: resolved, source })
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.gateway/gateway.toml", home)
}
