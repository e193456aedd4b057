//! # Server Configuration
//!
//! Plain settings struct with defaults, builder setters and environment
//! overrides. Loading from files is left to the embedding application; the
//! serde derives make that a one-liner.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding [`ServerConfig::address`]
pub const ENV_ADDRESS: &str = "STRATA_ADDRESS";
/// Environment variable overriding [`ServerConfig::max_body_size`]
pub const ENV_MAX_BODY_SIZE: &str = "STRATA_MAX_BODY_SIZE";
/// Environment variable overriding [`ServerConfig::shutdown_timeout`], in seconds
pub const ENV_SHUTDOWN_TIMEOUT_SECS: &str = "STRATA_SHUTDOWN_TIMEOUT_SECS";
/// Environment variable overriding [`ServerConfig::keep_alive`]
pub const ENV_KEEP_ALIVE: &str = "STRATA_KEEP_ALIVE";

/// HTTP Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Named middleware to install, outermost first
    pub middleware: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            middleware: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by `STRATA_*` environment variables
    ///
    /// Values that do not parse are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = parse_var(&lookup, ENV_ADDRESS) {
            self.address = address;
        }
        if let Some(size) = parse_var(&lookup, ENV_MAX_BODY_SIZE) {
            self.max_body_size = size;
        }
        if let Some(secs) = parse_var(&lookup, ENV_SHUTDOWN_TIMEOUT_SECS) {
            self.shutdown_timeout = Duration::from_secs(secs);
        }
        if let Some(keep_alive) = parse_var(&lookup, ENV_KEEP_ALIVE) {
            self.keep_alive = keep_alive;
        }
        self
    }

    /// Bind to `address`
    #[must_use]
    pub fn bind(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Set max request body size
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Set the graceful shutdown timeout
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enable or disable keep-alive
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Add a named middleware to the configured stack
    #[must_use]
    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        self.middleware.push(name.into());
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}
