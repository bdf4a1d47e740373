//! Engine metrics
//!
//! Counters for how much work recomputation passes and selectors do.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by a store's runtime, container and selectors
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Builder invocations
    pub build_count: AtomicU64,

    /// Clean instances re-cloned because a descendant changed
    pub refill_count: AtomicU64,

    /// Clean subtrees whose snapshot was reused as-is
    pub reuse_count: AtomicU64,

    /// Snapshots committed to the container
    pub commit_count: AtomicU64,

    /// Invocations removed from the tree
    pub unmount_count: AtomicU64,

    /// Selector reads answered from cache
    pub selector_hit_count: AtomicU64,

    /// Selector reads that ran the selector
    pub selector_miss_count: AtomicU64,

    /// Total time spent inside builder functions (nanoseconds)
    pub total_build_time_ns: AtomicU64,
}

impl EngineMetrics {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one builder invocation
    pub fn record_build(&self, duration: Duration) {
        self.build_count.fetch_add(1, Ordering::Relaxed);
        self.total_build_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Count a clean ancestor re-cloned and refilled
    pub fn record_refill(&self) {
        self.refill_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a clean subtree reused as is
    pub fn record_reuse(&self) {
        self.reuse_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a published snapshot
    pub fn record_commit(&self) {
        self.commit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an unmounted invocation
    pub fn record_unmount(&self) {
        self.unmount_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a selector read served from cache
    pub fn record_selector_hit(&self) {
        self.selector_hit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a selector run
    pub fn record_selector_miss(&self) {
        self.selector_miss_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.build_count,
            &self.refill_count,
            &self.reuse_count,
            &self.commit_count,
            &self.unmount_count,
            &self.selector_hit_count,
            &self.selector_miss_count,
            &self.total_build_time_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            builds: self.build_count.load(Ordering::Relaxed),
            refills: self.refill_count.load(Ordering::Relaxed),
            reuses: self.reuse_count.load(Ordering::Relaxed),
            commits: self.commit_count.load(Ordering::Relaxed),
            unmounts: self.unmount_count.load(Ordering::Relaxed),
            selector_hits: self.selector_hit_count.load(Ordering::Relaxed),
            selector_misses: self.selector_miss_count.load(Ordering::Relaxed),
            total_build_time_ns: self.total_build_time_ns.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Builder invocations
    pub builds: u64,
    /// Clean ancestors re-cloned and refilled
    pub refills: u64,
    /// Clean subtrees reused
    pub reuses: u64,
    /// Snapshots published
    pub commits: u64,
    /// Invocations unmounted
    pub unmounts: u64,
    /// Selector reads served from cache
    pub selector_hits: u64,
    /// Selector runs
    pub selector_misses: u64,
    /// Time spent in builders, in nanoseconds
    pub total_build_time_ns: u64,
}

impl MetricsSnapshot {
    /// Fraction of selector reads served from cache
    pub fn selector_hit_rate(&self) -> f64 {
        let total = self.selector_hits + self.selector_misses;
        if total == 0 {
            0.0
        } else {
            self.selector_hits as f64 / total as f64
        }
    }

    /// Average time per builder invocation
    pub fn avg_build_time(&self) -> Duration {
        if self.builds == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_build_time_ns / self.builds)
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "  Builds: {} | Refills: {} | Reuses: {} | Unmounts: {}",
            self.builds, self.refills, self.reuses, self.unmounts
        )?;
        writeln!(
            f,
            "  Commits: {} | Selector Hits: {} | Misses: {} | Hit Rate: {:.1}%",
            self.commits,
            self.selector_hits,
            self.selector_misses,
            self.selector_hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "  Avg Build: {:.3}ms | Total Build: {:.3}ms",
            self.avg_build_time().as_secs_f64() * 1000.0,
            Duration::from_nanos(self.total_build_time_ns).as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic() {
        let metrics = EngineMetrics::new();

        metrics.record_selector_hit();
        metrics.record_selector_hit();
        metrics.record_selector_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.selector_hits, 2);
        assert_eq!(snapshot.selector_misses, 1);
        assert_eq!(snapshot.selector_hit_rate(), 2.0 / 3.0);
    }

    #[test]
    fn test_metrics_build_time() {
        let metrics = EngineMetrics::new();

        metrics.record_build(Duration::from_millis(10));
        metrics.record_build(Duration::from_millis(20));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.builds, 2);
        assert_eq!(snapshot.avg_build_time(), Duration::from_millis(15));
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = EngineMetrics::new();

        metrics.record_commit();
        metrics.record_refill();
        metrics.reset();

        assert_eq!(metrics.snapshot(), EngineMetrics::new().snapshot());
    }
}
