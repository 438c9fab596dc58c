//! Clock Module
//!
//! Logical time used for TTL scoring and expiry cutoffs.

use parking_lot::RwLock;

// == Clock ==
/// Wall clock in Unix seconds, with an optional fixed override for tests.
#[derive(Debug, Default)]
pub struct Clock {
    fixed: RwLock<Option<i64>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces wall-clock time with `time`, or restores it with `None`.
    pub fn set_override(&self, time: Option<i64>) {
        *self.fixed.write() = time;
    }

    /// Current logical time in Unix seconds.
    pub fn now(&self) -> i64 {
        self.fixed
            .read()
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_and_restore() {
        let clock = Clock::new();
        let wall = clock.now();
        assert!(wall > 1_600_000_000);

        clock.set_override(Some(50));
        assert_eq!(clock.now(), 50);

        clock.set_override(None);
        assert!(clock.now() >= wall);
    }
}
