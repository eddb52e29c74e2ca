use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for observing cache behavior. Updated with relaxed ordering; read via `snapshot`.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub inserts: AtomicU64,
    pub updates: AtomicU64,
    pub removes: AtomicU64,
    pub count_evictions: AtomicU64,
    pub cost_evictions: AtomicU64,
    pub age_evictions: AtomicU64,
    pub clears: AtomicU64,
    pub trim_runs: AtomicU64,
    pub lock_contended: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            count_evictions: self.count_evictions.load(Ordering::Relaxed),
            cost_evictions: self.cost_evictions.load(Ordering::Relaxed),
            age_evictions: self.age_evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            trim_runs: self.trim_runs.load(Ordering::Relaxed),
            lock_contended: self.lock_contended.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
    pub count_evictions: u64,
    pub cost_evictions: u64,
    pub age_evictions: u64,
    pub clears: u64,
    pub trim_runs: u64,
    pub lock_contended: u64,
}

impl CacheMetricsSnapshot {
    /// Fraction of lookups that hit, in [0.0, 1.0]. Zero when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    pub fn evictions(&self) -> u64 {
        self.count_evictions + self.cost_evictions + self.age_evictions
    }
}
