//! 🔧 App Configuration: env vars, an optional TOML file, and a write key we cannot live without.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Layers, lowest to highest:
//! 1. the bare `write_key` env var, the one the old deployment scripts already export
//! 2. `ROWRELAY_*` env vars, with `__` for nesting (`ROWRELAY_RETRY__MAX_ATTEMPTS=5`)
//! 3. the TOML file, when one is given. The file wins on conflicts.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::error::ConfigurationError;
use crate::queue::DEFAULT_FLUSH_AT;
use crate::transport::{AuthScheme, HttpTransportConfig, RetryPolicy};

pub const ENV_PREFIX: &str = "ROWRELAY_";
pub const DEFAULT_HOST: &str = "https://api.segment.io";
pub const DEFAULT_OBJECTS_HOST: &str = "https://objects.segment.com";

/// 📦 Everything the relay needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🔒 The one credential. Optional here so `--dry-run` can live without it.
    #[serde(default)]
    pub write_key: Option<String>,
    /// 📦 Records per batch. Clamped to at least 1 on load.
    #[serde(default = "default_flush_at")]
    pub flush_at: usize,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_objects_host")]
    pub objects_host: String,
    #[serde(default)]
    pub auth_scheme: AuthScheme,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// 🔁 Retry knobs for transient delivery failures.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Doubles after every failed attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// ⏱️ reqwest client timeouts. Same numbers we have always trusted: 10s to connect, 30s overall.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_flush_at() -> usize {
    DEFAULT_FLUSH_AT
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_objects_host() -> String {
    DEFAULT_OBJECTS_HOST.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// 🔒 The write key, or the reason there is none. Blank counts as none.
    pub fn write_key(&self) -> Result<&str, ConfigurationError> {
        self.write_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigurationError::MissingWriteKey)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    /// 📡 Resolve the HTTP transport settings. Fails without a write key.
    pub fn http_transport_config(&self) -> Result<HttpTransportConfig, ConfigurationError> {
        Ok(HttpTransportConfig {
            host: self.host.clone(),
            objects_host: self.objects_host.clone(),
            write_key: self.write_key()?.to_string(),
            auth_scheme: self.auth_scheme,
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            timeout: Duration::from_secs(self.http.timeout_secs),
        })
    }

    fn clamped(mut self) -> Self {
        self.flush_at = self.flush_at.max(1);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        self
    }
}

/// 🚀 Load the config from env vars and, if given, a TOML file.
///
/// 💀 Only unparseable values fail here. A missing write key is the caller's
/// problem, surfaced by [`AppConfig::write_key`], because a dry run never needs one.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        config_file = %config_file_name.map_or_else(|| "<none>".into(), |p| p.display().to_string()),
        "🔧 loading configuration"
    );

    let config = Figment::new()
        .merge(Env::raw().only(&["write_key"]))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables ({ENV_PREFIX}*). \
             The file exists in our hearts, but maybe not in valid TOML.",
            path.display()
        ),
        None => format!(
            "💀 Failed to parse configuration from environment variables ({ENV_PREFIX}*). \
             No file was provided, so this one's all on the environment."
        ),
    };

    let app_config: AppConfig = config
        .extract()
        .map_err(ConfigurationError::from)
        .context(context_msg)?;
    Ok(app_config.clamped())
}
