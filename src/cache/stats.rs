//! Table cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for table cache operations.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups answered by a ready entry.
    pub hits: AtomicU64,
    /// Lookups that had to open the table.
    pub misses: AtomicU64,
    /// Tables opened successfully.
    pub opens: AtomicU64,
    /// Table opens that failed.
    pub open_failures: AtomicU64,
    /// Lookups that waited for another caller's open.
    pub waits: AtomicU64,
    /// Idle readers dropped to stay within capacity.
    pub evictions: AtomicU64,
    /// Retirements postponed because the table was still referenced.
    pub deferred_retirements: AtomicU64,
    /// Readers destroyed for any reason.
    pub destroyed: AtomicU64,
    /// Tables skipped because a scan's table filter rejected them.
    pub tables_filtered: AtomicU64,
}

/// Plain copy of [`CacheStats`] taken at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub opens: u64,
    pub open_failures: u64,
    pub waits: u64,
    pub evictions: u64,
    pub deferred_retirements: u64,
    pub destroyed: u64,
    pub tables_filtered: u64,
}

impl CacheStats {
    /// Create new stats.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_n(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    /// Get hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Copy out the current counter values.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            deferred_retirements: self.deferred_retirements.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            tables_filtered: self.tables_filtered.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.opens,
            &self.open_failures,
            &self.waits,
            &self.evictions,
            &self.deferred_retirements,
            &self.destroyed,
            &self.tables_filtered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
