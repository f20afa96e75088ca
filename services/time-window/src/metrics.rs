//! Observability counters for a window
//!
//! Tracks fetch traffic against the historical source, records entering the
//! window from each side, skipped records and failed loads. A forward
//! extension window shares its parent's metrics so totals stay in one place.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Core metrics for one window (and the temporary windows it absorbs).
pub struct WindowMetrics {
    // Historical source
    pub fetches_issued: AtomicU64,
    pub fetches_empty: AtomicU64,
    pub fetch_latency_us: Mutex<LatencyTracker>,

    // Records
    pub records_prepended: AtomicU64,
    pub records_appended: AtomicU64,
    pub records_skipped: AtomicU64,

    // Loads
    pub loads_completed: AtomicU64,
    pub loads_failed: AtomicU64,
    pub merges: AtomicU64,
}

/// Plain copy of the counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub fetches_issued: u64,
    pub fetches_empty: u64,
    pub records_prepended: u64,
    pub records_appended: u64,
    pub records_skipped: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub merges: u64,
}

impl WindowMetrics {
    pub fn new() -> Self {
        Self {
            fetches_issued: AtomicU64::new(0),
            fetches_empty: AtomicU64::new(0),
            fetch_latency_us: Mutex::new(LatencyTracker::new(1000)),
            records_prepended: AtomicU64::new(0),
            records_appended: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            loads_completed: AtomicU64::new(0),
            loads_failed: AtomicU64::new(0),
            merges: AtomicU64::new(0),
        }
    }

    /// Record one call to the historical source.
    pub fn record_fetch(&self, latency_us: u64, empty: bool) {
        self.fetches_issued.fetch_add(1, Ordering::Relaxed);
        if empty {
            self.fetches_empty.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut tracker) = self.fetch_latency_us.lock() {
            tracker.record(latency_us);
        }
    }

    pub fn record_prepended(&self) {
        self.records_prepended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_appended(&self) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fetched or streamed record that was not added.
    pub fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self, failed: bool) {
        if failed {
            self.loads_failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.loads_completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_merge(&self) {
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetches_issued: self.fetches_issued.load(Ordering::Relaxed),
            fetches_empty: self.fetches_empty.load(Ordering::Relaxed),
            records_prepended: self.records_prepended.load(Ordering::Relaxed),
            records_appended: self.records_appended.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            loads_completed: self.loads_completed.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
        }
    }

    /// p99 fetch latency in microseconds, if any fetch was recorded.
    pub fn fetch_latency_p99_us(&self) -> Option<u64> {
        self.fetch_latency_us
            .lock()
            .ok()
            .and_then(|tracker| tracker.percentile(99))
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let s = self.snapshot();
        let mut m = BTreeMap::new();
        m.insert("fetches_issued".to_string(), s.fetches_issued);
        m.insert("fetches_empty".to_string(), s.fetches_empty);
        m.insert("records_prepended".to_string(), s.records_prepended);
        m.insert("records_appended".to_string(), s.records_appended);
        m.insert("records_skipped".to_string(), s.records_skipped);
        m.insert("loads_completed".to_string(), s.loads_completed);
        m.insert("loads_failed".to_string(), s.loads_failed);
        m.insert("merges".to_string(), s.merges);
        m
    }
}

impl Default for WindowMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_recording() {
        let metrics = WindowMetrics::new();
        metrics.record_fetch(100, false);
        metrics.record_fetch(300, true);

        let s = metrics.snapshot();
        assert_eq!(s.fetches_issued, 2);
        assert_eq!(s.fetches_empty, 1);
        assert_eq!(metrics.fetch_latency_p99_us(), Some(300));
    }

    #[test]
    fn test_load_outcomes() {
        let metrics = WindowMetrics::new();
        metrics.record_load(false);
        metrics.record_load(true);
        metrics.record_load(false);

        let s = metrics.snapshot();
        assert_eq!(s.loads_completed, 2);
        assert_eq!(s.loads_failed, 1);
    }

    #[test]
    fn test_latency_tracker_window_eviction() {
        let mut tracker = LatencyTracker::new(3);
        tracker.record(1000);
        tracker.record(1);
        tracker.record(2);
        tracker.record(3);
        // 1000 evicted
        assert_eq!(tracker.percentile(100), Some(3));
    }

    #[test]
    fn test_metrics_export() {
        let metrics = WindowMetrics::new();
        metrics.record_prepended();
        metrics.record_appended();
        metrics.record_skipped();
        metrics.record_merge();

        let exported = metrics.export();
        assert_eq!(exported["records_prepended"], 1);
        assert_eq!(exported["records_appended"], 1);
        assert_eq!(exported["records_skipped"], 1);
        assert_eq!(exported["merges"], 1);
        assert_eq!(exported["fetches_issued"], 0);
    }
}
