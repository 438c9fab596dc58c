//! Cache Definition Module
//!
//! The part of an externally registered cache definition the store needs.

use sha2::{Digest, Sha256};

// == Cache Definition ==
/// Identifies one logical cache and its expiry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDefinition {
    id: String,
    ttl: Option<u64>,
}

impl CacheDefinition {
    /// Creates a definition without TTL.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ttl: None,
        }
    }

    /// Sets a TTL in seconds. Zero disables TTL.
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.ttl = (seconds > 0).then_some(seconds);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// TTL in seconds, if entries of this cache expire.
    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    /// Remote container id: lowercase hex SHA-256 of the definition id.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.id.as_bytes()))
    }
}
