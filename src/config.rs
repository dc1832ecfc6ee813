//! Server configuration.
//!
//! Three knobs, each with a default, readable from a config file (any serde
//! format) or from `WEBBY_*` environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

pub const ENV_HOST: &str = "WEBBY_HOST";
pub const ENV_PORT: &str = "WEBBY_PORT";
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "WEBBY_SHUTDOWN_TIMEOUT_MS";

/// Where to listen and how long to wait for in-flight requests on stop.
///
/// Missing fields take their defaults, so a file may name only what it
/// changes:
///
/// ```toml
/// port = 9000
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind. Default `0.0.0.0`.
    pub host: IpAddr,
    /// `0` asks the OS for an ephemeral port. Default `8080`.
    pub port: u16,
    /// Upper bound on draining in-flight connections. Default `5000`.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `WEBBY_HOST`, `WEBBY_PORT` and
    /// `WEBBY_SHUTDOWN_TIMEOUT_MS` where set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// Blank values are ignored. Values that fail to parse are ignored with
    /// a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(host) = parsed(&lookup, ENV_HOST) {
            config.host = host;
        }
        if let Some(port) = parsed(&lookup, ENV_PORT) {
            config.port = port;
        }
        if let Some(ms) = parsed(&lookup, ENV_SHUTDOWN_TIMEOUT_MS) {
            config.shutdown_timeout_ms = ms;
        }
        config
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = raw, "ignoring unparsable environment value");
            None
        }
    }
}
