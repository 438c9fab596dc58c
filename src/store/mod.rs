//! Store Module
//!
//! Namespaced cache store on a remote key-value server: read/write path, TTL
//! index and expiry, and distributed locks.

mod clock;
mod definition;
mod lock;
mod stats;
#[allow(clippy::module_inception)]
mod store;
mod traits;
mod ttl;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::Clock;
pub use definition::CacheDefinition;
pub use lock::{LockManager, LockState, LockTiming};
pub use stats::StoreStats;
pub use store::{RedisStore, TTL_SUFFIX};
pub use traits::{KeyAwareStore, KeyValueStore, LockableStore, SearchableStore, TtlStore};
pub use ttl::{ExpiryReport, EXPIRY_BATCH_SIZE};
