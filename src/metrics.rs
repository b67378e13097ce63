//! Performance metrics for the aggregation pipeline.
//!
//! Lightweight in-memory collection: lock-free atomic counters for the
//! high-frequency events (one per candidate or per call) and a DashMap of
//! timing histograms for the suspending operations. Overhead per update is
//! a handful of nanoseconds, cheap enough to leave enabled in production.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Global metrics registry (singleton)
static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::new()));

/// Get the global metrics instance
pub fn metrics() -> &'static Arc<Metrics> {
    &METRICS
}

/// Metrics registry for the aggregation pipeline
#[derive(Debug)]
pub struct Metrics {
    // Cache verdicts per call
    cache_fresh: AtomicU64,
    cache_stale: AtomicU64,

    // Live queries actually issued
    live_queries: AtomicU64,

    // Gate outcomes per candidate
    gate_accepted: AtomicU64,
    gate_rejected: AtomicU64,

    // Emitted completions and flush boundaries
    emitted: AtomicU64,
    flush_boundaries: AtomicU64,

    // Timing histograms (operation name -> durations in microseconds)
    operation_timings: DashMap<String, Vec<u64>>,
}

impl Metrics {
    /// Creates a new metrics registry
    pub fn new() -> Self {
        Self {
            cache_fresh: AtomicU64::new(0),
            cache_stale: AtomicU64::new(0),
            live_queries: AtomicU64::new(0),
            gate_accepted: AtomicU64::new(0),
            gate_rejected: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            flush_boundaries: AtomicU64::new(0),
            operation_timings: DashMap::new(),
        }
    }

    /// Records a call served without a live query becoming necessary
    pub fn record_cache_fresh(&self) {
        self.cache_fresh.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a call whose cached state was judged stale
    pub fn record_cache_stale(&self) {
        self.cache_stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the fraction of calls with a fresh cache (0.0 to 1.0)
    pub fn cache_fresh_rate(&self) -> f64 {
        let fresh = self.cache_fresh.load(Ordering::Relaxed);
        let stale = self.cache_stale.load(Ordering::Relaxed);
        let total = fresh + stale;

        if total == 0 {
            0.0
        } else {
            fresh as f64 / total as f64
        }
    }

    /// Records a live query being issued
    pub fn record_live_query(&self) {
        self.live_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a candidate accepted by the gate
    pub fn record_gate_accept(&self) {
        self.gate_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a candidate rejected by the gate
    pub fn record_gate_reject(&self) {
        self.gate_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one completion handed to the consumer
    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one flush boundary
    pub fn record_flush(&self) {
        self.flush_boundaries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the timing of an operation
    ///
    /// # Arguments
    /// * `operation` - Name of the operation (e.g., "cache_lookup")
    /// * `duration` - Duration of the operation
    pub fn record_timing(&self, operation: &str, duration: Duration) {
        let micros = duration.as_micros() as u64;

        self.operation_timings
            .entry(operation.to_string())
            .or_default()
            .push(micros);
    }

    /// Gets summary statistics for an operation
    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        self.operation_timings.get(operation).map(|timings| {
            let mut sorted = timings.value().clone();
            sorted.sort_unstable();

            let count = sorted.len();
            if count == 0 {
                return OperationStats::default();
            }

            let sum: u64 = sorted.iter().sum();
            let mean = sum / count as u64;

            let p50_idx = count / 2;
            let p95_idx = (count as f64 * 0.95) as usize;
            let p99_idx = (count as f64 * 0.99) as usize;

            OperationStats {
                count,
                min_micros: sorted[0],
                max_micros: sorted[count - 1],
                mean_micros: mean,
                p50_micros: sorted[p50_idx],
                p95_micros: sorted[p95_idx.min(count - 1)],
                p99_micros: sorted[p99_idx.min(count - 1)],
            }
        })
    }

    /// Gets a summary report of all counters
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            cache_fresh: self.cache_fresh.load(Ordering::Relaxed),
            cache_stale: self.cache_stale.load(Ordering::Relaxed),
            cache_fresh_rate: self.cache_fresh_rate(),
            live_queries: self.live_queries.load(Ordering::Relaxed),
            gate_accepted: self.gate_accepted.load(Ordering::Relaxed),
            gate_rejected: self.gate_rejected.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            flush_boundaries: self.flush_boundaries.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics (useful for testing)
    pub fn reset(&self) {
        self.cache_fresh.store(0, Ordering::Relaxed);
        self.cache_stale.store(0, Ordering::Relaxed);
        self.live_queries.store(0, Ordering::Relaxed);
        self.gate_accepted.store(0, Ordering::Relaxed);
        self.gate_rejected.store(0, Ordering::Relaxed);
        self.emitted.store(0, Ordering::Relaxed);
        self.flush_boundaries.store(0, Ordering::Relaxed);
        self.operation_timings.clear();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a single operation
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub count: usize,
    pub min_micros: u64,
    pub max_micros: u64,
    pub mean_micros: u64,
    pub p50_micros: u64, // Median
    pub p95_micros: u64,
    pub p99_micros: u64,
}

/// Summary of all counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cache_fresh: u64,
    pub cache_stale: u64,
    pub cache_fresh_rate: f64,
    pub live_queries: u64,
    pub gate_accepted: u64,
    pub gate_rejected: u64,
    pub emitted: u64,
    pub flush_boundaries: u64,
}

/// RAII guard for automatic timing measurement
///
/// Records the duration of a scope in the global registry when dropped.
pub struct TimingGuard {
    operation: String,
    start: Instant,
}

impl TimingGuard {
    /// Creates a new timing guard for the given operation
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        metrics().record_timing(&self.operation, duration);
    }
}
