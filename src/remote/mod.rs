//! Remote Module
//!
//! The wire contract the store consumes from a Redis-compatible server, and
//! its implementations.
//!
//! # Implementations
//! - [`RedisBackend`] - single node or cluster connection via the redis crate
//! - [`MemoryBackend`] - in-process server with the same semantics

mod address;
mod connection;
mod memory;

pub use address::{parse_servers, ServerAddress, DEFAULT_PORT};
pub use memory::MemoryBackend;
pub use connection::{connect, RedisBackend};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RemoteResult;

// == Remote Backend ==
/// Commands the store needs from the remote key-value server.
///
/// Every `key` is the logical key; implementations apply the configured
/// key prefix themselves.
#[async_trait]
pub trait RemoteBackend: std::fmt::Debug + Send + Sync + 'static {
    /// `HGET key field`
    async fn hget(&self, key: &str, field: &str) -> RemoteResult<Option<Vec<u8>>>;

    /// `HMGET key field...`, aligned with `fields`
    async fn hmget(&self, key: &str, fields: &[String]) -> RemoteResult<Vec<Option<Vec<u8>>>>;

    /// `HSET key field value`
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> RemoteResult<()>;

    /// `HSET key field value [field value...]`, returns the number of fields written
    async fn hset_multiple(&self, key: &str, pairs: Vec<(String, Vec<u8>)>) -> RemoteResult<usize>;

    /// `HDEL key field...`, returns the number of fields removed
    async fn hdel(&self, key: &str, fields: &[String]) -> RemoteResult<usize>;

    /// `HKEYS key`
    async fn hkeys(&self, key: &str) -> RemoteResult<Vec<String>>;

    /// `HEXISTS key field`
    async fn hexists(&self, key: &str, field: &str) -> RemoteResult<bool>;

    /// `ZADD key score member [score member...]`, returns the number of new members
    async fn zadd_multiple(&self, key: &str, members: Vec<(i64, String)>) -> RemoteResult<usize>;

    /// `ZRANGEBYSCORE key min max LIMIT 0 count`, ascending by score
    async fn zrangebyscore_limit(
        &self,
        key: &str,
        min: i64,
        max: i64,
        count: usize,
    ) -> RemoteResult<Vec<String>>;

    /// `ZREM key member...`, returns the number of members removed
    async fn zrem(&self, key: &str, members: &[String]) -> RemoteResult<usize>;

    /// `DEL key`, returns the number of keys removed
    async fn del(&self, key: &str) -> RemoteResult<usize>;

    /// `SET key value NX PX ttl`, true when the key was created
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> RemoteResult<bool>;

    /// `GET key`
    async fn get(&self, key: &str) -> RemoteResult<Option<String>>;

    /// `PING`
    async fn ping(&self) -> RemoteResult<()>;

    /// `used_memory` from `INFO memory`, `None` when not reported
    async fn used_memory(&self) -> RemoteResult<Option<u64>>;

    /// `MEMORY USAGE key`, `None` when the key is absent or unsupported
    async fn memory_usage(&self, key: &str) -> RemoteResult<Option<u64>>;
}
