//! Error types for the cache store
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Remote Error Enum ==
/// Failure of a single call against the remote key-value server.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Error reported by the redis client (IO, protocol, server reply)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The call did not complete within the configured timeout
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The server cannot be reached
    #[error("Remote store unavailable")]
    Unavailable,

    /// The remote key holds a different kind of structure
    #[error("Wrong type for remote key: {0}")]
    WrongType(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Unknown or invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// TTL expiry requested on a definition without a TTL
    #[error("Definition '{0}' has no TTL configured")]
    TtlNotConfigured(String),

    /// Value could not be serialized, deserialized, compressed or decompressed
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

// == Result Type Aliases ==
/// Convenience Result type for the cache store.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Result of a single remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
