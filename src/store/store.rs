//! Redis Store Module
//!
//! Maps one cache definition onto one remote hash container, with an optional
//! sorted TTL index next to it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::codec::{CacheValue, Codec, IoBytes};
use crate::config::StoreConfig;
use crate::error::RemoteResult;
use crate::remote::{self, RemoteBackend};
use crate::store::{
    CacheDefinition, Clock, KeyAwareStore, KeyValueStore, LockManager, LockState, LockTiming,
    LockableStore, SearchableStore, StoreStats,
};

/// Suffix of the sorted index tracking write times for TTL definitions
pub const TTL_SUFFIX: &str = "_ttl";

// == Redis Store ==
/// A cache store instance backed by a shared remote server.
///
/// A store whose connection failed is not ready: every read misses and every
/// write fails, without touching the network.
#[derive(Debug)]
pub struct RedisStore {
    name: String,
    definition: CacheDefinition,
    hash: String,
    ttl_key: String,
    codec: Codec,
    pub(crate) backend: Option<Arc<dyn RemoteBackend>>,
    pub(crate) clock: Clock,
    stats: Mutex<StoreStats>,
    locks: LockManager,
    warnings: Vec<String>,
}

impl RedisStore {
    // == Constructors ==
    /// Connects to the configured server(s).
    ///
    /// Never fails: a connection error is logged and yields a store that is
    /// not ready. Skipped server lines are kept as warnings either way.
    pub async fn connect(
        name: impl Into<String>,
        definition: CacheDefinition,
        config: &StoreConfig,
    ) -> Self {
        let name = name.into();
        let (addresses, mut warnings) = remote::parse_servers(&config.server, config.encryption);
        match remote::connect(config, &addresses).await {
            Ok(backend) => Self::build(name, definition, config, Some(Arc::new(backend)), warnings),
            Err(err) => {
                error!(store = %name, error = ?err, "could not connect to redis");
                warnings.push(format!("connection failed: {err:#}"));
                Self::build(name, definition, config, None, warnings)
            }
        }
    }

    /// Builds a ready store on an existing backend.
    pub fn with_backend(
        name: impl Into<String>,
        definition: CacheDefinition,
        config: &StoreConfig,
        backend: Arc<dyn RemoteBackend>,
    ) -> Self {
        Self::build(name.into(), definition, config, Some(backend), Vec::new())
    }

    fn build(
        name: String,
        definition: CacheDefinition,
        config: &StoreConfig,
        backend: Option<Arc<dyn RemoteBackend>>,
        mut warnings: Vec<String>,
    ) -> Self {
        let (codec, codec_warnings) = Codec::resolve(&config.serializer, &config.compressor);
        warnings.extend(codec_warnings);

        let hash = definition.hash();
        let ttl_key = format!("{hash}{TTL_SUFFIX}");
        let locks = LockManager::new(backend.clone(), LockTiming::from_config(config));

        debug!(
            store = %name,
            definition = definition.id(),
            ttl = ?definition.ttl(),
            serializer = %codec.serializer,
            compressor = %codec.compressor,
            ready = backend.is_some(),
            "store initialised"
        );

        Self {
            name,
            definition,
            hash,
            ttl_key,
            codec,
            backend,
            clock: Clock::new(),
            stats: Mutex::new(StoreStats::new()),
            locks,
            warnings,
        }
    }

    /// Overrides lock polling and deadlines.
    pub fn with_lock_timing(mut self, timing: LockTiming) -> Self {
        self.locks.set_timing(timing);
        self
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &CacheDefinition {
        &self.definition
    }

    /// Remote hash container id.
    pub fn definition_hash(&self) -> &str {
        &self.hash
    }

    /// Remote sorted index id used when the definition has a TTL.
    pub fn ttl_index_key(&self) -> &str {
        &self.ttl_key
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns true when a connection was established.
    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }

    /// Configuration and connection problems found while building the store.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.lock().clone()
    }

    /// Size of the last payload read or written.
    pub fn last_io_bytes(&self) -> IoBytes {
        self.stats.lock().io_bytes(self.codec.compresses())
    }

    /// Keys of the locks this instance currently holds.
    pub fn held_locks(&self) -> Vec<String> {
        self.locks.held_locks()
    }

    /// Fixes the logical clock used for TTL scores, or restores wall time.
    pub fn set_time_override(&self, time: Option<i64>) {
        self.clock.set_override(time);
    }

    /// Memory used by the hash container, when the server reports it.
    pub async fn store_total_size(&self) -> Option<u64> {
        let backend = self.backend.as_ref()?;
        match backend.memory_usage(&self.hash).await {
            Ok(size) => size,
            Err(err) => {
                debug!(store = %self.name, error = %err, "memory usage not available");
                None
            }
        }
    }

    // == Instance Deleted ==
    /// Releases held locks and drops the connection.
    pub async fn instance_deleted(self) {
        let released = self.locks.release_all().await;
        let stats = self.stats();
        debug!(
            store = %self.name,
            released,
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate(),
            "store instance deleted"
        );
    }

    fn record_io_bytes(&self, bytes: usize) {
        if self.codec.compresses() {
            self.stats.lock().set_last_io_bytes(bytes);
        }
    }

    /// Removes fields and, best-effort, their TTL index members.
    async fn delete_fields(
        &self,
        backend: &dyn RemoteBackend,
        keys: &[String],
    ) -> RemoteResult<usize> {
        let removed = backend.hdel(&self.hash, keys).await?;
        if self.definition.ttl().is_some() {
            if let Err(err) = backend.zrem(&self.ttl_key, keys).await {
                warn!(store = %self.name, error = %err, "could not update TTL index");
            }
        }
        Ok(removed)
    }

    fn index_members<'a>(&self, keys: impl Iterator<Item = &'a String>) -> Vec<(i64, String)> {
        let now = self.clock.now();
        keys.map(|key| (now, key.clone())).collect()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    // == Get ==
    async fn get(&self, key: &str) -> Option<CacheValue> {
        let backend = self.backend.as_ref()?;
        let payload = match backend.hget(&self.hash, key).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(store = %self.name, key, error = %err, "get failed");
                None
            }
        };
        if let Some(bytes) = &payload {
            self.record_io_bytes(bytes.len());
        }

        let value = self.codec.decode(payload.as_deref()).unwrap_or_else(|err| {
            warn!(store = %self.name, key, error = %err, "could not decode value");
            None
        });

        let mut stats = self.stats.lock();
        if value.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        value
    }

    // == Get Many ==
    async fn get_many(&self, keys: &[String]) -> Vec<Option<CacheValue>> {
        let Some(backend) = &self.backend else {
            return vec![None; keys.len()];
        };
        let payloads = match backend.hmget(&self.hash, keys).await {
            Ok(payloads) => payloads,
            Err(err) => {
                warn!(store = %self.name, keys = keys.len(), error = %err, "get_many failed");
                vec![None; keys.len()]
            }
        };

        let mut total_bytes = 0;
        let values: Vec<Option<CacheValue>> = payloads
            .iter()
            .zip(keys)
            .map(|(payload, key)| {
                if let Some(bytes) = payload {
                    total_bytes += bytes.len();
                }
                self.codec.decode(payload.as_deref()).unwrap_or_else(|err| {
                    warn!(store = %self.name, key = %key, error = %err, "could not decode value");
                    None
                })
            })
            .collect();
        self.record_io_bytes(total_bytes);

        let mut stats = self.stats.lock();
        for value in &values {
            if value.is_some() {
                stats.record_hit();
            } else {
                stats.record_miss();
            }
        }
        values
    }

    // == Set ==
    async fn set(&self, key: &str, value: &CacheValue) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        let payload = match self.codec.encode(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(store = %self.name, key, error = %err, "could not encode value");
                return false;
            }
        };
        self.record_io_bytes(payload.len());

        if let Err(err) = backend.hset(&self.hash, key, payload).await {
            warn!(store = %self.name, key, error = %err, "set failed");
            return false;
        }
        self.stats.lock().record_writes(1);

        if self.definition.ttl().is_some() {
            let members = vec![(self.clock.now(), key.to_string())];
            if let Err(err) = backend.zadd_multiple(&self.ttl_key, members).await {
                warn!(store = %self.name, key, error = %err, "could not update TTL index");
            }
        }
        true
    }

    // == Set Many ==
    async fn set_many(&self, pairs: &[(String, CacheValue)]) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };

        let mut fields = Vec::with_capacity(pairs.len());
        let mut total_bytes = 0;
        for (key, value) in pairs {
            match self.codec.encode(value) {
                Ok(payload) => {
                    total_bytes += payload.len();
                    fields.push((key.clone(), payload));
                }
                Err(err) => warn!(store = %self.name, key = %key, error = %err, "could not encode value"),
            }
        }
        if fields.is_empty() {
            return 0;
        }
        self.record_io_bytes(total_bytes);

        let members = self
            .definition
            .ttl()
            .map(|_| self.index_members(fields.iter().map(|(key, _)| key)));

        let written = match backend.hset_multiple(&self.hash, fields).await {
            Ok(written) => written,
            Err(err) => {
                warn!(store = %self.name, error = %err, "set_many failed");
                return 0;
            }
        };
        self.stats.lock().record_writes(written);

        if let Some(members) = members {
            if let Err(err) = backend.zadd_multiple(&self.ttl_key, members).await {
                warn!(store = %self.name, error = %err, "could not update TTL index");
            }
        }
        written
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> bool {
        self.delete_many(&[key.to_string()]).await > 0
    }

    // == Delete Many ==
    async fn delete_many(&self, keys: &[String]) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };
        if keys.is_empty() {
            return 0;
        }
        match self.delete_fields(backend.as_ref(), keys).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(store = %self.name, keys = keys.len(), error = %err, "delete failed");
                0
            }
        }
    }

    // == Purge ==
    async fn purge(&self) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        if let Err(err) = backend.del(&self.hash).await {
            warn!(store = %self.name, error = %err, "purge failed");
            return false;
        }
        if self.definition.ttl().is_some() {
            if let Err(err) = backend.del(&self.ttl_key).await {
                warn!(store = %self.name, error = %err, "could not purge TTL index");
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl KeyAwareStore for RedisStore {
    async fn has(&self, key: &str) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        backend.hexists(&self.hash, key).await.unwrap_or_else(|err| {
            warn!(store = %self.name, key, error = %err, "has failed");
            false
        })
    }

    async fn has_any(&self, keys: &[String]) -> bool {
        for key in keys {
            if self.has(key).await {
                return true;
            }
        }
        false
    }

    async fn has_all(&self, keys: &[String]) -> bool {
        for key in keys {
            if !self.has(key).await {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl SearchableStore for RedisStore {
    async fn find_all(&self) -> Vec<String> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        backend.hkeys(&self.hash).await.unwrap_or_else(|err| {
            warn!(store = %self.name, error = %err, "find_all failed");
            Vec::new()
        })
    }

    async fn find_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.find_all()
            .await
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl LockableStore for RedisStore {
    async fn acquire_lock(&self, key: &str, owner: &str) -> bool {
        self.locks.acquire(key, owner).await
    }

    async fn check_lock_state(&self, key: &str, owner: &str) -> LockState {
        self.locks.check(key, owner).await
    }

    async fn release_lock(&self, key: &str, owner: &str) -> bool {
        self.locks.release(key, owner).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CompressorKind, SerializerKind};
    use crate::remote::MemoryBackend;

    fn store_on(backend: &MemoryBackend, config: &StoreConfig) -> RedisStore {
        RedisStore::with_backend(
            "test",
            CacheDefinition::new("unit/store"),
            config,
            Arc::new(backend.clone()),
        )
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());

        assert!(store.set("k", &CacheValue::from("v")).await);
        assert_eq!(store.get("k").await, Some(CacheValue::from("v")));
        assert!(store.delete("k").await);
        assert!(!store.delete("k").await);
        assert_eq!(store.get("k").await, None);

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_entries_live_in_definition_hash() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());
        store.set("k", &CacheValue::Int(1)).await;

        assert!(backend.contains_raw(store.definition_hash()).await);
        // No TTL, no index
        assert!(!backend.contains_raw(store.ttl_index_key()).await);
    }

    #[tokio::test]
    async fn test_has_any_short_circuits() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());
        store.set("b", &CacheValue::Null).await;

        let before = backend.command_count();
        assert!(store.has_any(&keys(&["a", "b", "c", "d"])).await);
        assert_eq!(backend.command_count() - before, 2);

        let before = backend.command_count();
        assert!(!store.has_all(&keys(&["a", "b"])).await);
        assert_eq!(backend.command_count() - before, 1);

        assert!(store.has_all(&[]).await);
        assert!(!store.has_any(&[]).await);
    }

    #[tokio::test]
    async fn test_last_io_bytes_only_with_compression() {
        let backend = MemoryBackend::new();
        let plain = store_on(&backend, &StoreConfig::default());
        plain.set("k", &CacheValue::from("value")).await;
        assert_eq!(plain.last_io_bytes(), IoBytes::NotSupported);

        let config = StoreConfig {
            compressor: "gzip".to_string(),
            ..StoreConfig::default()
        };
        let zipped = store_on(&backend.with_prefix("z:"), &config);
        zipped.set("k", &CacheValue::from("value")).await;
        let IoBytes::Bytes(written) = zipped.last_io_bytes() else {
            panic!("compressed store must report bytes");
        };
        assert!(written > 0);

        zipped.get_many(&keys(&["k", "k"])).await;
        assert_eq!(zipped.last_io_bytes(), IoBytes::Bytes(written * 2));
    }

    #[tokio::test]
    async fn test_codec_config_warnings_and_fallback() {
        let backend = MemoryBackend::new();
        let config = StoreConfig {
            serializer: "pickle".to_string(),
            ..StoreConfig::default()
        };
        let store = store_on(&backend, &config);

        assert_eq!(store.codec().serializer, SerializerKind::None);
        assert_eq!(store.codec().compressor, CompressorKind::None);
        assert_eq!(store.warnings().len(), 1);

        // Passthrough still stores strings
        assert!(store.set("k", &CacheValue::from("raw")).await);
        assert_eq!(store.get("k").await, Some(CacheValue::from("raw")));
        // but cannot store structured values or non-string scalars
        assert!(!store.set("l", &CacheValue::List(vec![])).await);
        assert!(!store.set("n", &CacheValue::Int(5)).await);
        assert_eq!(store.get("n").await, None);
    }

    #[tokio::test]
    async fn test_floats_read_back_exactly_or_fail_to_store() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());

        let exact = CacheValue::Float(1.0715660391465826e-75);
        assert!(store.set("exact", &exact).await);
        assert_eq!(store.get("exact").await, Some(exact));

        assert!(!store.set("inf", &CacheValue::Float(f64::INFINITY)).await);
        assert!(!store.has("inf").await);
    }

    #[tokio::test]
    async fn test_set_many_skips_unencodable_values() {
        let backend = MemoryBackend::new();
        let config = StoreConfig {
            serializer: "none".to_string(),
            ..StoreConfig::default()
        };
        let store = store_on(&backend, &config);
        let pairs = vec![
            ("a".to_string(), CacheValue::from("1")),
            ("b".to_string(), CacheValue::List(vec![CacheValue::Null])),
        ];

        assert_eq!(store.set_many(&pairs).await, 1);
        assert_eq!(store.find_all().await, vec!["a".to_string()]);
        assert_eq!(store.set_many(&[]).await, 0);
    }

    #[tokio::test]
    async fn test_offline_backend_is_absorbed() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());
        store.set("k", &CacheValue::Int(1)).await;
        backend.set_offline(true);

        assert_eq!(store.get("k").await, None);
        assert_eq!(store.get_many(&keys(&["k"])).await, vec![None]);
        assert!(!store.set("k", &CacheValue::Int(2)).await);
        assert_eq!(store.set_many(&[("x".to_string(), CacheValue::Null)]).await, 0);
        assert!(!store.delete("k").await);
        assert!(!store.has("k").await);
        assert!(store.find_all().await.is_empty());
        assert!(!store.purge().await);
        assert_eq!(store.store_total_size().await, None);

        backend.set_offline(false);
        assert_eq!(store.get("k").await, Some(CacheValue::Int(1)));
    }

    #[tokio::test]
    async fn test_corrupt_payload_reads_as_miss() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());
        backend
            .hset(store.definition_hash(), "k", b"{not json".to_vec())
            .await
            .unwrap();

        assert_eq!(store.get("k").await, None);
        assert!(store.has("k").await);
    }

    #[tokio::test]
    async fn test_store_total_size() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());
        assert_eq!(store.store_total_size().await, None);

        store.set("k", &CacheValue::Bytes(vec![7; 256])).await;
        assert!(store.store_total_size().await.unwrap() > 256);
    }

    #[tokio::test]
    async fn test_instance_deleted_releases_locks() {
        let backend = MemoryBackend::new();
        let store = store_on(&backend, &StoreConfig::default());
        assert!(store.acquire_lock("lock1", "me").await);
        assert_eq!(store.held_locks(), vec!["lock1".to_string()]);

        store.instance_deleted().await;
        assert!(!backend.contains_raw("lock1").await);
    }
}
