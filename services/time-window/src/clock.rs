//! Wall clock used for watermark clamping and streaming bookkeeping

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of "now" in Unix milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> f64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    // f64 bits
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_millis: f64) -> Self {
        Self {
            now: AtomicU64::new(now_millis.to_bits()),
        }
    }

    pub fn set(&self, now_millis: f64) {
        self.now.store(now_millis.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta_millis: f64) {
        self.set(self.now_millis() + delta_millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> f64 {
        f64::from_bits(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000.0);
        assert_eq!(clock.now_millis(), 1_000.0);
        clock.advance(500.5);
        assert_eq!(clock.now_millis(), 1_500.5);
        clock.set(3.0);
        assert_eq!(clock.now_millis(), 3.0);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_577_836_800_000.0);
    }
}
