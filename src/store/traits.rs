//! Capability Traits
//!
//! Each trait is one capability of a cache store. Callers depend on the
//! narrowest one they need.

use async_trait::async_trait;

use crate::codec::CacheValue;
use crate::error::Result;
use crate::store::{ExpiryReport, LockState};

// == Key Value Store ==
/// Basic read/write contract used by the cache layer.
///
/// Failures never surface as errors: reads miss and writes report `false`
/// or a zero count.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<CacheValue>;

    /// Results are aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> Vec<Option<CacheValue>>;

    async fn set(&self, key: &str, value: &CacheValue) -> bool;

    /// Returns the number of fields written.
    async fn set_many(&self, pairs: &[(String, CacheValue)]) -> usize;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> bool;

    /// Returns the number of keys removed.
    async fn delete_many(&self, keys: &[String]) -> usize;

    /// Removes every entry. Succeeds on an already empty store.
    async fn purge(&self) -> bool;
}

// == Key Aware Store ==
/// Existence checks.
#[async_trait]
pub trait KeyAwareStore: Send + Sync {
    async fn has(&self, key: &str) -> bool;

    /// Stops at the first key found.
    async fn has_any(&self, keys: &[String]) -> bool;

    /// Stops at the first key missing.
    async fn has_all(&self, keys: &[String]) -> bool;
}

// == Searchable Store ==
/// Key enumeration.
#[async_trait]
pub trait SearchableStore: Send + Sync {
    async fn find_all(&self) -> Vec<String>;

    async fn find_by_prefix(&self, prefix: &str) -> Vec<String>;
}

// == Lockable Store ==
/// Cross-process mutual exclusion.
#[async_trait]
pub trait LockableStore: Send + Sync {
    /// Waits up to the configured lock wait for the lock.
    async fn acquire_lock(&self, key: &str, owner: &str) -> bool;

    async fn check_lock_state(&self, key: &str, owner: &str) -> LockState;

    /// Only releases a lock `owner` currently holds.
    async fn release_lock(&self, key: &str, owner: &str) -> bool;
}

// == TTL Store ==
/// Batch expiry for stores that track entry age.
#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Fails with [`crate::CacheError::TtlNotConfigured`] when the definition
    /// has no TTL.
    async fn expire_ttl(&self) -> Result<ExpiryReport>;
}
