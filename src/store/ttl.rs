//! TTL Expiry Module
//!
//! Batch purge of entries whose TTL index score is older than the cutoff.
//!
//! Native per-key expiry is not used: one hash per definition keeps bulk
//! purge a single `DEL`, and the sorted index makes "everything older than X"
//! a range query.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CacheError, RemoteResult, Result};
use crate::remote::RemoteBackend;
use crate::store::{RedisStore, TtlStore};

/// Maximum number of keys fetched and deleted per round trip
pub const EXPIRY_BATCH_SIZE: usize = 10_000;

// == Expiry Report ==
/// Outcome of one expiry pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpiryReport {
    /// Number of hash fields removed
    pub keys_removed: usize,
    /// Number of non-empty batches processed
    pub batches: usize,
    pub elapsed: Duration,
    /// Server memory before the pass, if reported
    pub memory_before: Option<u64>,
    /// Server memory after the pass, if reported
    pub memory_after: Option<u64>,
}

impl ExpiryReport {
    /// Approximate bytes freed; negative when other writers grew the server
    /// meanwhile.
    pub fn memory_reclaimed(&self) -> Option<i64> {
        match (self.memory_before, self.memory_after) {
            (Some(before), Some(after)) => Some(before as i64 - after as i64),
            _ => None,
        }
    }
}

#[async_trait]
impl TtlStore for RedisStore {
    // == Expire TTL ==
    async fn expire_ttl(&self) -> Result<ExpiryReport> {
        let Some(ttl) = self.definition().ttl() else {
            return Err(CacheError::TtlNotConfigured(
                self.definition().id().to_string(),
            ));
        };
        let Some(backend) = &self.backend else {
            return Ok(ExpiryReport::default());
        };

        let started = Instant::now();
        let cutoff = self.clock.now() - ttl as i64;
        let mut report = ExpiryReport {
            memory_before: used_memory(backend.as_ref()).await,
            ..ExpiryReport::default()
        };

        loop {
            let batch = match self.expire_batch(backend.as_ref(), cutoff).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(store = %self.name(), error = %err, "expiry pass interrupted");
                    break;
                }
            };
            if batch.fetched > 0 {
                report.batches += 1;
                report.keys_removed += batch.removed;
            }
            if batch.fetched < EXPIRY_BATCH_SIZE {
                break;
            }
        }

        report.memory_after = used_memory(backend.as_ref()).await;
        report.elapsed = started.elapsed();
        info!(
            store = %self.name(),
            keys = report.keys_removed,
            batches = report.batches,
            elapsed = ?report.elapsed,
            reclaimed = ?report.memory_reclaimed(),
            "TTL expiry finished"
        );
        Ok(report)
    }
}

struct Batch {
    fetched: usize,
    removed: usize,
}

impl RedisStore {
    /// Deletes up to one batch of keys scored at or before `cutoff`.
    ///
    /// Index removal errors propagate here, unlike on the regular delete
    /// path, so a failing index cannot make the loop refetch the same batch.
    async fn expire_batch(&self, backend: &dyn RemoteBackend, cutoff: i64) -> RemoteResult<Batch> {
        let keys = backend
            .zrangebyscore_limit(self.ttl_index_key(), i64::MIN, cutoff, EXPIRY_BATCH_SIZE)
            .await?;
        if keys.is_empty() {
            return Ok(Batch {
                fetched: 0,
                removed: 0,
            });
        }

        let removed = backend.hdel(self.definition_hash(), &keys).await?;
        backend.zrem(self.ttl_index_key(), &keys).await?;
        debug!(store = %self.name(), fetched = keys.len(), removed, "expired batch");

        Ok(Batch {
            fetched: keys.len(),
            removed,
        })
    }
}

async fn used_memory(backend: &dyn RemoteBackend) -> Option<u64> {
    backend.used_memory().await.unwrap_or_else(|err| {
        debug!(error = %err, "memory usage not reported");
        None
    })
}
