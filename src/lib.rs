//! Redis Cache Store - A remote cache backend on Redis
//!
//! Stores each cache definition in one Redis hash, with optional TTL
//! tracking, a pluggable serializer/compressor pipeline and distributed locks.

pub mod codec;
pub mod config;
pub mod error;
pub mod remote;
pub mod store;

pub use codec::{CacheValue, Codec, CompressorKind, IoBytes, SerializerKind};
pub use config::StoreConfig;
pub use error::{CacheError, RemoteError, Result};
pub use remote::{MemoryBackend, RedisBackend, RemoteBackend};
pub use store::{
    CacheDefinition, ExpiryReport, KeyAwareStore, KeyValueStore, LockState, LockTiming,
    LockableStore, RedisStore, SearchableStore, TtlStore,
};
