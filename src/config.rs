//! Spider configuration
//!
//! [`SpiderConfig`] derives serde so a host can embed it in its own config
//! file; [`SpiderConfig::from_env`] covers the common case of a process
//! configured through the environment.

use crate::constants::{
    BOOTSTRAP_NODES, DEFAULT_MAX_CONNECTIONS, DEFAULT_NODES_MAX_SIZE, DEFAULT_PORT,
    DEFAULT_QUEUE_PER_LIMIT, DEFAULT_TIMEOUT, DEFAULT_WALK_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot parse {var}={value:?}")]
    Env { var: String, value: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiderConfig {
    /// UDP address the DHT crawler binds to
    pub listen_addr: SocketAddr,

    /// Routing table capacity
    pub nodes_max_size: usize,

    /// Concurrent outbound metadata sessions
    pub max_connections: usize,

    /// Connect and inactivity timeout per session, in milliseconds
    pub timeout_ms: u64,

    /// Distinct infohashes buffered for a first attempt
    /// (defaults to `max_connections`)
    pub queue_max_size: Option<usize>,

    /// Alternate peers buffered per outstanding infohash
    pub queue_per_limit: usize,

    /// How often an idle crawler walks the routing table, in milliseconds
    pub walk_interval_ms: u64,

    /// `host:port` entry points into the DHT
    pub bootstrap_nodes: Vec<String>,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            nodes_max_size: DEFAULT_NODES_MAX_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            queue_max_size: None,
            queue_per_limit: DEFAULT_QUEUE_PER_LIMIT,
            walk_interval_ms: DEFAULT_WALK_INTERVAL.as_millis() as u64,
            bootstrap_nodes: BOOTSTRAP_NODES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SpiderConfig {
    /// Defaults overridden by `SPIDER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Like [`from_env`](Self::from_env), reading from any key/value source.
    ///
    /// Recognised keys: `SPIDER_HOST`, `SPIDER_PORT`, `SPIDER_NODES_MAX_SIZE`,
    /// `SPIDER_MAX_CONNECTIONS`, `SPIDER_TIMEOUT_MS`, and `SPIDER_BOOTSTRAP`
    /// (comma-separated `host:port` list). Others are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "SPIDER_HOST" => config.listen_addr.set_ip(parse(key, value)?),
                "SPIDER_PORT" => config.listen_addr.set_port(parse(key, value)?),
                "SPIDER_NODES_MAX_SIZE" => config.nodes_max_size = parse(key, value)?,
                "SPIDER_MAX_CONNECTIONS" => config.max_connections = parse(key, value)?,
                "SPIDER_TIMEOUT_MS" => config.timeout_ms = parse(key, value)?,
                "SPIDER_BOOTSTRAP" => {
                    config.bootstrap_nodes = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                _ => {}
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes_max_size == 0 {
            return Err(ConfigError::invalid("nodes_max_size", "must be at least 1"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::invalid("max_connections", "must be at least 1"));
        }
        if self.queue_max_size() == 0 {
            return Err(ConfigError::invalid("queue_max_size", "must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be positive"));
        }
        if self.walk_interval_ms == 0 {
            return Err(ConfigError::invalid("walk_interval_ms", "must be positive"));
        }
        if self.bootstrap_nodes.is_empty() {
            return Err(ConfigError::invalid("bootstrap_nodes", "at least one node is required"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn walk_interval(&self) -> Duration {
        Duration::from_millis(self.walk_interval_ms)
    }

    pub fn queue_max_size(&self) -> usize {
        self.queue_max_size.unwrap_or(self.max_connections)
    }
}

fn parse<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}
