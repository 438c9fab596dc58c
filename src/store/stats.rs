//! Store Statistics Module
//!
//! Tracks read/write counters and the byte size of the last payload moved
//! through the codec.

use serde::Serialize;

use crate::codec::IoBytes;

// == Store Stats ==
/// Per-instance IO metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Number of reads that found a value
    pub hits: u64,
    /// Number of reads that found nothing (or could not decode it)
    pub misses: u64,
    /// Number of fields written
    pub writes: u64,
    /// Payload bytes of the last read or write, when compression is active
    pub last_io_bytes: Option<usize>,
}

impl StoreStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates hits / (hits + misses), or 0.0 if nothing was read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_writes(&mut self, count: usize) {
        self.writes += count as u64;
    }

    pub fn set_last_io_bytes(&mut self, bytes: usize) {
        self.last_io_bytes = Some(bytes);
    }

    /// Byte accounting as exposed to callers.
    pub fn io_bytes(&self, compressing: bool) -> IoBytes {
        match (compressing, self.last_io_bytes) {
            (true, Some(bytes)) => IoBytes::Bytes(bytes),
            (true, None) => IoBytes::Bytes(0),
            (false, _) => IoBytes::NotSupported,
        }
    }
}
