use crate::cache::core::CacheState;
use crate::cache::index::{Entry, OrderedIndex};
use crate::cache::lock::IndexLock;
use crate::cache::metrics::CacheMetrics;
use crate::utils::num::usize_to_u64;
use std::hash::Hash;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// Which limit a trim enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimTarget {
    /// Keep at most this many entries.
    Count(usize),
    /// Keep the aggregate cost at or below this.
    Cost(u64),
    /// Evict entries not accessed within this long.
    Age(Duration),
}

impl TrimTarget {
    fn clears_everything(self) -> bool {
        match self {
            TrimTarget::Count(limit) => limit == 0,
            TrimTarget::Cost(limit) => limit == 0,
            TrimTarget::Age(limit) => limit.is_zero(),
        }
    }

    /// Whether the tail must go. The list is in recency order, so the tail is also the
    /// stalest entry and an age sweep can stop at the first entry inside the window.
    fn exceeded<K: Hash + Eq + Clone, V>(self, index: &OrderedIndex<K, V>, now: Duration) -> bool {
        match self {
            TrimTarget::Count(limit) => index.len() > limit,
            TrimTarget::Cost(limit) => index.total_cost() > limit,
            TrimTarget::Age(limit) => index
                .peek_tail()
                .is_some_and(|e| now.saturating_sub(e.last_access()) > limit),
        }
    }

    fn op(self) -> &'static str {
        match self {
            TrimTarget::Count(_) => "trim_count",
            TrimTarget::Cost(_) => "trim_cost",
            TrimTarget::Age(_) => "trim_age",
        }
    }

    fn counter(self, metrics: &CacheMetrics) -> &AtomicU64 {
        match self {
            TrimTarget::Count(_) => &metrics.count_evictions,
            TrimTarget::Cost(_) => &metrics.cost_evictions,
            TrimTarget::Age(_) => &metrics.age_evictions,
        }
    }
}

/// Applies one policy until its limit holds and returns the evicted entries, which the
/// caller releases outside the lock.
///
/// A zero limit drains the index in one blocking step. Otherwise the sweep takes the lock
/// cooperatively, re-checks the limit, evicts at most one entry and hands the lock back
/// fairly, so foreground callers wait for at most one eviction. Within limits this does
/// nothing at all.
pub(crate) fn trim<K: Hash + Eq + Clone, V>(
    lock: &IndexLock<CacheState<K, V>>,
    metrics: &CacheMetrics,
    target: TrimTarget,
    now: Duration,
    backoff: Duration,
) -> Vec<Entry<K, V>> {
    {
        let mut state = lock.lock();
        if target.clears_everything() {
            if state.index.is_empty() {
                return Vec::new();
            }
            let drained = state.index.drain();
            drop(state);
            CacheMetrics::bump(&metrics.clears, 1);
            record(metrics, target, &drained);
            return drained;
        }
        if !target.exceeded(&state.index, now) {
            return Vec::new();
        }
    }

    let mut holder = Vec::new();
    loop {
        let mut state =
            lock.lock_cooperative(backoff, || CacheMetrics::bump(&metrics.lock_contended, 1));
        let evicted =
            if target.exceeded(&state.index, now) { state.index.evict_tail() } else { None };
        state.unlock_fair();
        match evicted {
            Some(entry) => holder.push(entry),
            None => break,
        }
    }
    record(metrics, target, &holder);
    holder
}

fn record<K, V>(metrics: &CacheMetrics, target: TrimTarget, evicted: &[Entry<K, V>]) {
    if evicted.is_empty() {
        return;
    }
    let n = usize_to_u64(evicted.len());
    let freed_cost = evicted.iter().fold(0u64, |acc, e| acc.saturating_add(e.cost()));
    CacheMetrics::bump(target.counter(metrics), n);
    CacheMetrics::bump(&metrics.trim_runs, 1);
    log::debug!(target: "memtier::trim", "{:?}: evicted {} entries, freed cost {}", target, n, freed_cost);
    crate::dev6!(
        "{{\"bench\":\"cache\",\"op\":\"{}\",\"evicted\":{},\"freed_cost\":{}}}",
        target.op(),
        n,
        freed_cost
    );
}
