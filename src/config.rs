//! Client configuration parsed from environment variables.
//!
//! The relay address is the only value a deployment must choose; everything
//! else has a default. The binary layers CLI flags over [`ClientConfig::from_env`].

use std::fmt;
use std::time::Duration;

use crate::reconnect::{
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS, ReconnectPolicy,
};

pub const DEFAULT_RELAY_URL: &str = "wss://chatsphere-backend-8wxp.onrender.com";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid relay endpoint `{0}`: expected ws://, wss://, http:// or https://")]
    InvalidEndpoint(String),
}

/// A websocket relay address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint(String);

impl RelayEndpoint {
    /// Validate a relay address, rewriting `http(s)://` to `ws(s)://`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEndpoint`] for other schemes or an empty host.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let url = if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            trimmed.to_owned()
        };

        let host = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .ok_or_else(|| ConfigError::InvalidEndpoint(raw.to_owned()))?;
        if host.is_empty() || host.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint(raw.to_owned()));
        }

        Ok(Self(url))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: RelayEndpoint,
    pub connect_timeout: Duration,
    /// Maximum messages kept in the log; `None` keeps everything.
    pub history_limit: Option<usize>,
    /// Reconnect after connection loss; `None` ends the session instead.
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: RelayEndpoint(DEFAULT_RELAY_URL.to_owned()),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            history_limit: None,
            reconnect: None,
        }
    }
}

impl ClientConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `CHATSPHERE_RELAY_URL`: relay address, default [`DEFAULT_RELAY_URL`]
    /// - `CHATSPHERE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `CHATSPHERE_HISTORY_LIMIT`: unset keeps the whole log
    /// - `CHATSPHERE_RECONNECT`: `1`/`true` enables reconnection
    /// - `CHATSPHERE_RECONNECT_INITIAL_MS`: default 1000
    /// - `CHATSPHERE_RECONNECT_MAX_MS`: default 10000
    /// - `CHATSPHERE_RECONNECT_MAX_ATTEMPTS`: default 5
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEndpoint`] when `CHATSPHERE_RELAY_URL` is not a relay address.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = match std::env::var("CHATSPHERE_RELAY_URL") {
            Ok(raw) => RelayEndpoint::parse(&raw)?,
            Err(_) => RelayEndpoint(DEFAULT_RELAY_URL.to_owned()),
        };
        let connect_timeout =
            Duration::from_secs(env_parse("CHATSPHERE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS));
        let history_limit = std::env::var("CHATSPHERE_HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0);

        let reconnect = env_flag("CHATSPHERE_RECONNECT").then(|| ReconnectPolicy {
            initial_backoff: Duration::from_millis(env_parse(
                "CHATSPHERE_RECONNECT_INITIAL_MS",
                DEFAULT_INITIAL_BACKOFF_MS,
            )),
            max_backoff: Duration::from_millis(env_parse("CHATSPHERE_RECONNECT_MAX_MS", DEFAULT_MAX_BACKOFF_MS)),
            max_attempts: env_parse("CHATSPHERE_RECONNECT_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
        });

        Ok(Self { endpoint, connect_timeout, history_limit, reconnect })
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
