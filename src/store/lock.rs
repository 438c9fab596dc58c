//! Lock Manager Module
//!
//! Cross-process locks built on `SET NX PX`. A lock is owned only by the
//! caller whose conditional create succeeded; it self-heals after the lock
//! timeout if the holder disappears.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::remote::RemoteBackend;

// == Lock State ==
/// Who holds a lock, from one owner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockState {
    HeldByOwner,
    HeldByOther,
    Unheld,
}

// == Lock Timing ==
/// Deadlines and polling intervals for lock acquisition.
///
/// Each poll sleeps its interval plus up to 10% random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTiming {
    /// Total time to keep trying
    pub wait: Duration,
    /// Lifetime of an acquired lock
    pub timeout: Duration,
    /// Poll interval while within `fast_poll_window`
    pub fast_poll: Duration,
    /// Poll interval afterwards
    pub slow_poll: Duration,
    pub fast_poll_window: Duration,
}

impl LockTiming {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            wait: config.lock_wait(),
            timeout: config.lock_timeout(),
            ..Self::default()
        }
    }

    /// Sleep before the next attempt, given how long we have waited so far.
    pub fn backoff(&self, waited: Duration) -> Duration {
        let base = if waited < self.fast_poll_window {
            self.fast_poll
        } else {
            self.slow_poll
        };
        let max_jitter = base.as_millis() as u64 / 10;
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        base + Duration::from_millis(jitter)
    }
}

impl Default for LockTiming {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(crate::config::DEFAULT_LOCK_WAIT),
            timeout: Duration::from_secs(crate::config::DEFAULT_LOCK_TIMEOUT),
            fast_poll: Duration::from_millis(100),
            slow_poll: Duration::from_millis(1000),
            fast_poll_window: Duration::from_secs(5),
        }
    }
}

// == Lock Manager ==
/// Acquires and releases locks, remembering the ones this process holds.
///
/// Locks still registered when the manager is dropped are released on the
/// current tokio runtime, if there is one; otherwise they expire on their own.
pub struct LockManager {
    backend: Option<Arc<dyn RemoteBackend>>,
    timing: LockTiming,
    held: Mutex<HashMap<String, String>>,
}

impl LockManager {
    pub fn new(backend: Option<Arc<dyn RemoteBackend>>, timing: LockTiming) -> Self {
        Self {
            backend,
            timing,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_timing(&mut self, timing: LockTiming) {
        self.timing = timing;
    }

    /// Keys of the locks this process currently holds.
    pub fn held_locks(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.held.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    // == Acquire ==
    /// Polls until the lock is granted or the wait budget is spent.
    pub async fn acquire(&self, key: &str, owner: &str) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };

        let started = Instant::now();
        loop {
            match backend.set_nx_px(key, owner, self.timing.timeout).await {
                Ok(true) => {
                    self.held.lock().insert(key.to_string(), owner.to_string());
                    debug!(lock = key, owner, "lock acquired");
                    return true;
                }
                Ok(false) => {}
                Err(err) => warn!(lock = key, error = %err, "lock attempt failed"),
            }

            let waited = started.elapsed();
            if waited >= self.timing.wait {
                debug!(lock = key, owner, ?waited, "gave up waiting for lock");
                return false;
            }
            tokio::time::sleep(self.timing.backoff(waited)).await;
        }
    }

    // == Check ==
    pub async fn check(&self, key: &str, owner: &str) -> LockState {
        match &self.backend {
            Some(backend) => lock_state(backend.as_ref(), key, owner).await,
            None => LockState::Unheld,
        }
    }

    // == Release ==
    /// Deletes the lock only if `owner` still holds it.
    pub async fn release(&self, key: &str, owner: &str) -> bool {
        self.held.lock().remove(key);
        match &self.backend {
            Some(backend) => release_remote(backend.as_ref(), key, owner).await,
            None => false,
        }
    }

    // == Release All ==
    /// Releases every lock still registered, returning how many were freed.
    ///
    /// Reaching a registered lock here means its holder never released it.
    pub async fn release_all(&self) -> usize {
        let held: Vec<(String, String)> = self.held.lock().drain().collect();
        let mut released = 0;
        for (key, owner) in held {
            warn!(lock = %key, owner = %owner, "releasing lock that was never released");
            if let Some(backend) = &self.backend {
                if release_remote(backend.as_ref(), &key, &owner).await {
                    released += 1;
                }
            }
        }
        released
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("ready", &self.backend.is_some())
            .field("timing", &self.timing)
            .field("held", &self.held_locks())
            .finish()
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        let held: Vec<(String, String)> = self.held.get_mut().drain().collect();
        if held.is_empty() {
            return;
        }
        for (key, owner) in &held {
            warn!(lock = %key, owner = %owner, "lock still held at shutdown");
        }

        let Some(backend) = self.backend.clone() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (key, owner) in held {
                        release_remote(backend.as_ref(), &key, &owner).await;
                    }
                });
            }
            Err(_) => warn!("no async runtime at shutdown, locks will expire on their own"),
        }
    }
}

/// Transport failures read as `Unheld`.
async fn lock_state(backend: &dyn RemoteBackend, key: &str, owner: &str) -> LockState {
    match backend.get(key).await {
        Ok(Some(holder)) if holder == owner => LockState::HeldByOwner,
        Ok(Some(_)) => LockState::HeldByOther,
        Ok(None) => LockState::Unheld,
        Err(err) => {
            warn!(lock = key, error = %err, "could not read lock state");
            LockState::Unheld
        }
    }
}

async fn release_remote(backend: &dyn RemoteBackend, key: &str, owner: &str) -> bool {
    if lock_state(backend, key, owner).await != LockState::HeldByOwner {
        return false;
    }
    match backend.del(key).await {
        Ok(removed) => removed > 0,
        Err(err) => {
            warn!(lock = key, error = %err, "could not release lock");
            false
        }
    }
}
