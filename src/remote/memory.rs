//! In-Memory Backend Module
//!
//! An in-process implementation of the remote wire contract. Clones share the
//! same keyspace, so several stores (or simulated processes) can contend on it
//! exactly as they would on a shared server.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::RemoteBackend;
use crate::error::{RemoteError, RemoteResult};

// == Sorted Set ==
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    /// Returns true when the member is new.
    fn insert(&mut self, score: i64, member: String) -> bool {
        let previous = self.scores.insert(member.clone(), score);
        if let Some(old) = previous {
            self.ordered.remove(&(old, member.clone()));
        }
        self.ordered.insert((score, member));
        previous.is_none()
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

// == Value ==
#[derive(Debug)]
enum Value {
    Plain(String),
    Hash(HashMap<String, Vec<u8>>),
    Sorted(SortedSet),
}

impl Value {
    fn approximate_size(&self) -> u64 {
        let bytes = match self {
            Value::Plain(s) => s.len(),
            Value::Hash(h) => h.iter().map(|(k, v)| k.len() + v.len()).sum(),
            Value::Sorted(z) => z.scores.keys().map(|m| m.len() + 8).sum(),
        };
        bytes as u64
    }
}

// == Entry ==
/// A stored key with optional expiry.
#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Expired once the current time reaches the expiry instant.
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Instant::now() >= expires,
            None => false,
        }
    }
}

// == Memory Backend ==
/// In-process Redis-like server.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    offline: Arc<AtomicBool>,
    commands: Arc<AtomicU64>,
    prefix: String,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle on the same keyspace that prefixes every key.
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..self.clone()
        }
    }

    /// Makes every subsequent command fail as if the server were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of commands received across all handles.
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::SeqCst)
    }

    /// Number of live top-level keys across all prefixes.
    pub async fn key_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    /// Returns true if the unprefixed key exists.
    pub async fn contains_raw(&self, raw_key: &str) -> bool {
        let entries = self.entries.read().await;
        entries.get(raw_key).is_some_and(|e| !e.is_expired())
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn begin(&self) -> RemoteResult<()> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable);
        }
        Ok(())
    }

    /// Runs `f` against a live entry, treating expired entries as absent.
    async fn read<T>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> RemoteResult<T>) -> RemoteResult<T> {
        self.begin()?;
        let entries = self.entries.read().await;
        let value = entries
            .get(&self.key(key))
            .filter(|e| !e.is_expired())
            .map(|e| &e.value);
        f(value)
    }

    async fn with_hash<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Vec<u8>>) -> T,
    ) -> RemoteResult<T> {
        self.begin()?;
        let full_key = self.key(key);
        let mut entries = self.entries.write().await;
        purge_if_expired(&mut entries, &full_key);

        let entry = entries
            .entry(full_key.clone())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let Value::Hash(hash) = &mut entry.value else {
            return Err(RemoteError::WrongType(full_key));
        };
        let result = f(hash);
        if hash.is_empty() {
            entries.remove(&full_key);
        }
        Ok(result)
    }

    async fn with_sorted<T>(&self, key: &str, f: impl FnOnce(&mut SortedSet) -> T) -> RemoteResult<T> {
        self.begin()?;
        let full_key = self.key(key);
        let mut entries = self.entries.write().await;
        purge_if_expired(&mut entries, &full_key);

        let entry = entries
            .entry(full_key.clone())
            .or_insert_with(|| Entry::new(Value::Sorted(SortedSet::default())));
        let Value::Sorted(set) = &mut entry.value else {
            return Err(RemoteError::WrongType(full_key));
        };
        let result = f(set);
        if set.is_empty() {
            entries.remove(&full_key);
        }
        Ok(result)
    }
}

fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(Entry::is_expired) {
        entries.remove(key);
    }
}

fn wrong_type(key: &str) -> RemoteError {
    RemoteError::WrongType(key.to_string())
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn hget(&self, key: &str, field: &str) -> RemoteResult<Option<Vec<u8>>> {
        self.read(key, |value| match value {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        })
        .await
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> RemoteResult<Vec<Option<Vec<u8>>>> {
        self.read(key, |value| match value {
            None => Ok(vec![None; fields.len()]),
            Some(Value::Hash(h)) => Ok(fields.iter().map(|f| h.get(f).cloned()).collect()),
            Some(_) => Err(wrong_type(key)),
        })
        .await
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> RemoteResult<()> {
        self.with_hash(key, |h| {
            h.insert(field.to_string(), value);
        })
        .await
    }

    async fn hset_multiple(&self, key: &str, pairs: Vec<(String, Vec<u8>)>) -> RemoteResult<usize> {
        if pairs.is_empty() {
            self.begin()?;
            return Ok(0);
        }
        self.with_hash(key, |h| {
            let written = pairs.len();
            h.extend(pairs);
            written
        })
        .await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> RemoteResult<usize> {
        self.with_hash(key, |h| fields.iter().filter(|f| h.remove(*f).is_some()).count())
            .await
    }

    async fn hkeys(&self, key: &str) -> RemoteResult<Vec<String>> {
        self.read(key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::Hash(h)) => Ok(h.keys().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })
        .await
    }

    async fn hexists(&self, key: &str, field: &str) -> RemoteResult<bool> {
        self.read(key, |value| match value {
            None => Ok(false),
            Some(Value::Hash(h)) => Ok(h.contains_key(field)),
            Some(_) => Err(wrong_type(key)),
        })
        .await
    }

    async fn zadd_multiple(&self, key: &str, members: Vec<(i64, String)>) -> RemoteResult<usize> {
        self.with_sorted(key, |z| {
            members
                .into_iter()
                .filter(|(score, member)| z.insert(*score, member.clone()))
                .count()
        })
        .await
    }

    async fn zrangebyscore_limit(
        &self,
        key: &str,
        min: i64,
        max: i64,
        count: usize,
    ) -> RemoteResult<Vec<String>> {
        self.read(key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::Sorted(z)) => Ok(z
                .ordered
                .range((min, String::new())..)
                .take_while(|(score, _)| *score <= max)
                .take(count)
                .map(|(_, member)| member.clone())
                .collect()),
            Some(_) => Err(wrong_type(key)),
        })
        .await
    }

    async fn zrem(&self, key: &str, members: &[String]) -> RemoteResult<usize> {
        self.with_sorted(key, |z| members.iter().filter(|m| z.remove(m)).count())
            .await
    }

    async fn del(&self, key: &str) -> RemoteResult<usize> {
        self.begin()?;
        let mut entries = self.entries.write().await;
        match entries.remove(&self.key(key)) {
            Some(entry) if !entry.is_expired() => Ok(1),
            _ => Ok(0),
        }
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> RemoteResult<bool> {
        self.begin()?;
        let full_key = self.key(key);
        let mut entries = self.entries.write().await;
        purge_if_expired(&mut entries, &full_key);

        if entries.contains_key(&full_key) {
            return Ok(false);
        }
        let ttl = ttl.max(Duration::from_millis(1));
        entries.insert(
            full_key,
            Entry {
                value: Value::Plain(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> RemoteResult<Option<String>> {
        self.read(key, |value| match value {
            None => Ok(None),
            Some(Value::Plain(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        })
        .await
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.begin()
    }

    async fn used_memory(&self) -> RemoteResult<Option<u64>> {
        self.begin()?;
        let entries = self.entries.read().await;
        let total = entries
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .map(|(k, e)| k.len() as u64 + e.value.approximate_size())
            .sum();
        Ok(Some(total))
    }

    async fn memory_usage(&self, key: &str) -> RemoteResult<Option<u64>> {
        let full_key = self.key(key);
        self.read(key, |value| {
            Ok(value.map(|v| full_key.len() as u64 + v.approximate_size()))
        })
        .await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_hash_roundtrip() {
        let backend = MemoryBackend::new();
        backend.hset("h", "a", b"1".to_vec()).await.unwrap();

        assert_eq!(backend.hget("h", "a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.hget("h", "b").await.unwrap(), None);
        assert!(backend.hexists("h", "a").await.unwrap());
        assert_eq!(
            backend.hmget("h", &fields(&["b", "a"])).await.unwrap(),
            vec![None, Some(b"1".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_hdel_drops_empty_hash() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("h", vec![("a".into(), vec![1]), ("b".into(), vec![2])])
            .await
            .unwrap();

        assert_eq!(backend.hdel("h", &fields(&["a", "zz"])).await.unwrap(), 1);
        assert_eq!(backend.key_count().await, 1);
        assert_eq!(backend.hdel("h", &fields(&["b"])).await.unwrap(), 1);
        assert_eq!(backend.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_sorted_range_respects_score_and_limit() {
        let backend = MemoryBackend::new();
        backend
            .zadd_multiple(
                "z",
                vec![(30, "c".into()), (10, "a".into()), (20, "b".into()), (40, "d".into())],
            )
            .await
            .unwrap();

        let members = backend.zrangebyscore_limit("z", 0, 30, 2).await.unwrap();
        assert_eq!(members, vec!["a", "b"]);

        // Re-scoring moves the member rather than duplicating it
        backend.zadd_multiple("z", vec![(50, "a".into())]).await.unwrap();
        let members = backend.zrangebyscore_limit("z", 0, 100, 10).await.unwrap();
        assert_eq!(members, vec!["b", "c", "d", "a"]);
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let backend = MemoryBackend::new();
        backend.hset("h", "a", vec![1]).await.unwrap();
        let result = backend.zadd_multiple("h", vec![(1, "x".into())]).await;
        assert!(matches!(result, Err(RemoteError::WrongType(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_nx_px_expires() {
        let backend = MemoryBackend::new();
        assert!(backend
            .set_nx_px("lock", "a", Duration::from_secs(1))
            .await
            .unwrap());
        assert!(!backend
            .set_nx_px("lock", "b", Duration::from_secs(1))
            .await
            .unwrap());

        tokio::time::advance(Duration::from_millis(1001)).await;

        assert_eq!(backend.get("lock").await.unwrap(), None);
        assert!(backend
            .set_nx_px("lock", "b", Duration::from_secs(1))
            .await
            .unwrap());
        assert_eq!(backend.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_prefix_isolates_keys() {
        let shared = MemoryBackend::new();
        let a = shared.with_prefix("a:");
        let b = shared.with_prefix("b:");

        a.hset("h", "f", vec![1]).await.unwrap();
        assert!(!b.hexists("h", "f").await.unwrap());
        assert!(shared.contains_raw("a:h").await);
        assert_eq!(b.del("h").await.unwrap(), 0);
        assert_eq!(a.del("h").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_every_command() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(backend.ping().await, Err(RemoteError::Unavailable)));
        assert!(backend.hget("h", "a").await.is_err());

        backend.set_offline(false);
        assert!(backend.ping().await.is_ok());
        assert_eq!(backend.command_count(), 3);
    }

    #[tokio::test]
    async fn test_memory_reporting() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.used_memory().await.unwrap(), Some(0));
        backend.hset("h", "key", vec![0; 100]).await.unwrap();
        assert!(backend.used_memory().await.unwrap().unwrap() >= 100);
        assert!(backend.memory_usage("h").await.unwrap().unwrap() >= 100);
        assert_eq!(backend.memory_usage("missing").await.unwrap(), None);
    }
}
