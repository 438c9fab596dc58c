//! Configuration Module
//!
//! Handles loading and managing store configuration from environment variables
//! or from a deserialized options map.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default connection and per-call timeout in seconds
pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 3;
/// Default time to keep trying to acquire a lock, in seconds
pub const DEFAULT_LOCK_WAIT: u64 = 60;
/// Default lifetime of an acquired lock, in seconds
pub const DEFAULT_LOCK_TIMEOUT: u64 = 600;

/// Store configuration parameters.
///
/// Field aliases accept the flat option names used by existing deployments
/// (`connectiontimeout`, `lockwait`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// One or more newline separated server addresses
    pub server: String,
    /// Prefix prepended to every remote key
    pub prefix: Option<String>,
    /// Server password
    pub password: Option<String>,
    /// Serializer name or id (`none`, `generic`, `compact`)
    pub serializer: String,
    /// Compressor name or id (`none`, `gzip`, `zstd`)
    pub compressor: String,
    /// Connection and per-call timeout in seconds
    #[serde(alias = "connectiontimeout")]
    pub connection_timeout: u64,
    /// Seconds to keep polling for a lock before giving up
    #[serde(alias = "lockwait")]
    pub lock_wait: u64,
    /// Seconds after which an unreleased lock expires
    #[serde(alias = "locktimeout")]
    pub lock_timeout: u64,
    /// Connect over TLS
    pub encryption: bool,
    /// PEM file with the CA certificate used to verify the server
    #[serde(alias = "cafile")]
    pub ca_file: Option<PathBuf>,
    /// Treat `server` as the seed list of a cluster
    #[serde(alias = "clustermode")]
    pub cluster_mode: bool,
}

impl StoreConfig {
    /// Creates a new StoreConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_CACHE_SERVER` - Newline or comma separated servers (default: 127.0.0.1:6379)
    /// - `REDIS_CACHE_PREFIX` - Key prefix (default: none)
    /// - `REDIS_CACHE_PASSWORD` - Password (default: none)
    /// - `REDIS_CACHE_SERIALIZER` - Serializer (default: generic)
    /// - `REDIS_CACHE_COMPRESSOR` - Compressor (default: none)
    /// - `REDIS_CACHE_CONNECTION_TIMEOUT` - Seconds (default: 3)
    /// - `REDIS_CACHE_LOCK_WAIT` - Seconds (default: 60)
    /// - `REDIS_CACHE_LOCK_TIMEOUT` - Seconds (default: 600)
    /// - `REDIS_CACHE_ENCRYPTION` - `true`/`1` to enable TLS (default: false)
    /// - `REDIS_CACHE_CAFILE` - CA certificate path (default: none)
    /// - `REDIS_CACHE_CLUSTER_MODE` - `true`/`1` for cluster mode (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server: env::var("REDIS_CACHE_SERVER")
                .map(|v| v.replace(',', "\n"))
                .unwrap_or(defaults.server),
            prefix: non_empty_var("REDIS_CACHE_PREFIX"),
            password: non_empty_var("REDIS_CACHE_PASSWORD"),
            serializer: env::var("REDIS_CACHE_SERIALIZER").unwrap_or(defaults.serializer),
            compressor: env::var("REDIS_CACHE_COMPRESSOR").unwrap_or(defaults.compressor),
            connection_timeout: parsed_var("REDIS_CACHE_CONNECTION_TIMEOUT")
                .unwrap_or(defaults.connection_timeout),
            lock_wait: parsed_var("REDIS_CACHE_LOCK_WAIT").unwrap_or(defaults.lock_wait),
            lock_timeout: parsed_var("REDIS_CACHE_LOCK_TIMEOUT").unwrap_or(defaults.lock_timeout),
            encryption: flag_var("REDIS_CACHE_ENCRYPTION"),
            ca_file: non_empty_var("REDIS_CACHE_CAFILE").map(PathBuf::from),
            cluster_mode: flag_var("REDIS_CACHE_CLUSTER_MODE"),
        }
    }

    /// Parses a JSON options object, filling missing fields with defaults.
    pub fn from_json(options: &str) -> crate::error::Result<Self> {
        serde_json::from_str(options).map_err(|e| crate::error::CacheError::Config(e.to_string()))
    }

    /// Timeout applied to connecting and to every remote call.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Total time budget for acquiring a lock.
    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait)
    }

    /// Lifetime of an acquired lock.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout)
    }

    /// Key prefix, empty when none is configured.
    pub fn key_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:6379".to_string(),
            prefix: None,
            password: None,
            serializer: "generic".to_string(),
            compressor: "none".to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            lock_wait: DEFAULT_LOCK_WAIT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            encryption: false,
            ca_file: None,
            cluster_mode: false,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn flag_var(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
