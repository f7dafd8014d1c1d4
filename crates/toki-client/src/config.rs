//! Client configuration loaded from environment variables.
//!
//! All settings have defaults pointing at a local development backend so the
//! client can start with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use toki_shared::constants::{
    DEFAULT_API_URL, DEFAULT_EVENT_BUFFER, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_SOCKET_URL,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST collaborator, without trailing slash.
    /// Env: `TOKI_API_URL`
    /// Default: `http://localhost:4500/api`
    pub api_url: String,

    /// Endpoint of the persistent event channel.  Handed to the transport
    /// collaborator; the sync engine never dials it itself.
    /// Env: `TOKI_SOCKET_URL`
    /// Default: `http://localhost:4500`
    pub socket_url: String,

    /// Timeout applied to every REST request.
    /// Env: `TOKI_HTTP_TIMEOUT_SECS`
    /// Default: 15 seconds
    pub http_timeout: Duration,

    /// Explicit database location.  `None` uses the platform data dir.
    /// Env: `TOKI_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Capacity of the engine's message queue.
    /// Env: `TOKI_EVENT_BUFFER`
    /// Default: `256`
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            db_path: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("TOKI_API_URL").filter(|u| !u.trim().is_empty()) {
            config.api_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(url) = lookup("TOKI_SOCKET_URL").filter(|u| !u.trim().is_empty()) {
            config.socket_url = url.trim().to_string();
        }

        if let Some(val) = lookup("TOKI_HTTP_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.http_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid TOKI_HTTP_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(path) = lookup("TOKI_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("TOKI_EVENT_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.event_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid TOKI_EVENT_BUFFER, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
