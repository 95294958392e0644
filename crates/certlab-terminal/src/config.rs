//! Bridge configuration.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::TerminalResult;

/// Environment variable prefix for overrides, e.g.
/// `CERTLAB__ENDPOINT=wss://labs.example.net:3001`.
const ENV_PREFIX: &str = "CERTLAB";

/// Reconnection policy: exponential backoff with a cap, then give up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts before the session is declared failed.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given attempt (1-based): the base delay doubles
    /// per attempt, capped at `max_delay_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX))
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Configuration for terminal sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// WebSocket endpoint of the remote executor.
    pub endpoint: String,
    /// Interval between heartbeat pings while connected, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Watchdog timeout for a single connect attempt, in seconds.
    pub connect_timeout_secs: u64,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:3001".to_string(),
            heartbeat_interval_secs: 30,
            connect_timeout_secs: 10,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl TerminalConfig {
    /// Load configuration from an optional TOML file, then apply
    /// `CERTLAB__`-prefixed environment overrides.
    pub fn load(path: Option<&Path>) -> TerminalResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        let built = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(config_error)?;
        built.try_deserialize().map_err(config_error)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn config_error(err: config::ConfigError) -> crate::TerminalError {
    crate::TerminalError::Config(err.to_string())
}
