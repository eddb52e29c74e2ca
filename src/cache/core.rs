use crate::cache::config::{CacheConfig, normalize_backoff, normalize_interval};
use crate::cache::index::OrderedIndex;
use crate::cache::lock::IndexLock;
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::cache::policy::{self, TrimTarget};
use crate::cache::scheduler::{AutoTrim, AutoTrimState};
use crate::clock::{Clock, MonotonicClock};
use crate::errors::CacheError;
use crate::executor::{Executor, SerialQueue};
use crate::lifecycle::{LifecycleObserver, LifecycleSignal, SignalSource, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Callback run on a lifecycle signal, before any automatic clearing. Runs without the
/// cache lock held, so it may call back into the cache.
pub type CacheHook<K, V> = Arc<dyn Fn(&MemoryCache<K, V>) + Send + Sync>;

/// Everything guarded by the cache lock.
pub(crate) struct CacheState<K, V> {
    pub(crate) index: OrderedIndex<K, V>,
    pub(crate) config: CacheConfig,
}

/// A thread-safe, in-memory LRU cache bounded by entry count, aggregate cost and entry age.
///
/// Instances are always handed out as `Arc<MemoryCache<K, V>>`. Background work (auto-trim
/// ticks, deferred cost trims) only holds weak references, so dropping the last `Arc`
/// tears the cache down: the trim cycle is cancelled, signal subscriptions are removed
/// and all entries are released.
pub struct MemoryCache<K, V> {
    name: String,
    state: IndexLock<CacheState<K, V>>,
    metrics: CacheMetrics,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn Executor>,
    release_executor: RwLock<Arc<dyn Executor>>,
    auto_trim: AutoTrim,
    cost_trim_pending: AtomicBool,
    on_memory_pressure: RwLock<Option<CacheHook<K, V>>>,
    on_enter_background: RwLock<Option<CacheHook<K, V>>>,
    subscriptions: Mutex<Vec<(Arc<dyn SignalSource>, SubscriptionId)>>,
    this: Weak<Self>,
}

impl<K, V> std::fmt::Debug for MemoryCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("name", &self.name)
            .field("auto_trim", &self.auto_trim.state())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`MemoryCache`] with injected collaborators.
pub struct CacheBuilder<K, V> {
    config: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
    executor: Option<Arc<dyn Executor>>,
    release_executor: Option<Arc<dyn Executor>>,
    sources: Vec<Arc<dyn SignalSource>>,
    on_memory_pressure: Option<CacheHook<K, V>>,
    on_enter_background: Option<CacheHook<K, V>>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            clock: None,
            executor: None,
            release_executor: None,
            sources: Vec::new(),
            on_memory_pressure: None,
            on_enter_background: None,
        }
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Context for auto-trim ticks and background cost trims. Defaults to the shared
    /// background queue.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Context on which evicted values are dropped when releasing asynchronously.
    /// Defaults to the trim executor.
    #[must_use]
    pub fn release_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.release_executor = Some(executor);
        self
    }

    #[must_use]
    pub fn signal_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn on_memory_pressure(mut self, hook: impl Fn(&MemoryCache<K, V>) + Send + Sync + 'static) -> Self {
        self.on_memory_pressure = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_enter_background(mut self, hook: impl Fn(&MemoryCache<K, V>) + Send + Sync + 'static) -> Self {
        self.on_enter_background = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Arc<MemoryCache<K, V>> {
        let mut config = self.config;
        config.auto_trim_interval = normalize_interval(config.auto_trim_interval);
        config.trim_backoff = normalize_backoff(config.trim_backoff);
        let interval = config.auto_trim_interval;
        let executor: Arc<dyn Executor> = match self.executor {
            Some(e) => e,
            None => SerialQueue::background(),
        };
        let release_executor = self.release_executor.unwrap_or_else(|| executor.clone());
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let cache = Arc::new_cyclic(|this| MemoryCache {
            name: config.name.clone(),
            state: IndexLock::new(CacheState { index: OrderedIndex::new(), config }),
            metrics: CacheMetrics::default(),
            clock,
            executor,
            release_executor: RwLock::new(release_executor),
            auto_trim: AutoTrim::new(),
            cost_trim_pending: AtomicBool::new(false),
            on_memory_pressure: RwLock::new(self.on_memory_pressure),
            on_enter_background: RwLock::new(self.on_enter_background),
            subscriptions: Mutex::new(Vec::new()),
            this: this.clone(),
        });
        for source in self.sources {
            cache.attach(source);
        }
        if interval != Duration::MAX {
            cache.arm_auto_trim(interval);
        }
        log::debug!("cache {} created", cache.name);
        cache
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Unbounded cache with default configuration under `name`.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_config(CacheConfig::named(name))
    }

    pub fn with_config(config: CacheConfig) -> Arc<Self> {
        CacheBuilder::new(config).build()
    }

    pub fn builder(config: CacheConfig) -> CacheBuilder<K, V> {
        CacheBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // --- Lookup ---

    /// Returns a clone of the value and promotes the entry to most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let value = self.state.lock().index.touch(key, now).cloned();
        let counter = if value.is_some() { &self.metrics.hits } else { &self.metrics.misses };
        CacheMetrics::bump(counter, 1);
        value
    }

    /// Like [`Self::get`] without touching recency or access time.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.state.lock().index.peek(key).map(|e| e.value().clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().index.contains(key)
    }

    // --- Mutation ---

    pub fn set(&self, key: K, value: V) {
        self.upsert(key, Some(value), 0);
    }

    pub fn set_with_cost(&self, key: K, value: V, cost: u64) {
        self.upsert(key, Some(value), cost);
    }

    /// Inserts or replaces `key`. `None` removes it.
    ///
    /// If the entry count now exceeds the count limit, the least recently used entry is
    /// evicted right away. If the aggregate cost exceeds the cost limit, a cost trim is
    /// scheduled on the background executor instead: count overflow is corrected
    /// immediately one entry at a time, cost overflow eventually and in bulk.
    pub fn upsert(&self, key: K, value: Option<V>, cost: u64) {
        let Some(value) = value else {
            self.remove(&key);
            return;
        };
        let now = self.clock.now();
        let (replaced, evicted, over_cost, release_async) = {
            let mut state = self.state.lock();
            let replaced = state.index.upsert(key, value, cost, now);
            let evicted = if state.index.len() > state.config.count_limit {
                state.index.evict_tail()
            } else {
                None
            };
            let over_cost = state.index.total_cost() > state.config.cost_limit;
            (replaced, evicted, over_cost, state.config.release_asynchronously)
        };
        let counter = if replaced.is_some() { &self.metrics.updates } else { &self.metrics.inserts };
        CacheMetrics::bump(counter, 1);
        if let Some(old) = replaced {
            self.release(old, release_async);
        }
        if let Some(entry) = evicted {
            CacheMetrics::bump(&self.metrics.count_evictions, 1);
            self.release(entry, release_async);
        }
        if over_cost {
            self.schedule_cost_trim();
        }
    }

    /// Removes `key`, releasing its value per the release policy. Returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let (removed, release_async) = {
            let mut state = self.state.lock();
            (state.index.remove(key), state.config.release_asynchronously)
        };
        match removed {
            Some(entry) => {
                CacheMetrics::bump(&self.metrics.removes, 1);
                self.release(entry, release_async);
                true
            }
            None => false,
        }
    }

    /// Removes `key` and hands its value to the caller instead of releasing it.
    pub fn take(&self, key: &K) -> Option<V> {
        let removed = self.state.lock().index.remove(key)?;
        CacheMetrics::bump(&self.metrics.removes, 1);
        Some(removed.into_parts().1)
    }

    pub fn remove_all(&self) {
        let (drained, release_async) = {
            let mut state = self.state.lock();
            (state.index.drain(), state.config.release_asynchronously)
        };
        if !drained.is_empty() {
            CacheMetrics::bump(&self.metrics.clears, 1);
            log::debug!("cache {}: removed all {} entries", self.name, drained.len());
            self.release(drained, release_async);
        }
    }

    // --- Trimming ---

    /// Evicts least recently used entries until at most `limit` remain.
    pub fn trim_to_count(&self, limit: usize) {
        self.trim(TrimTarget::Count(limit));
    }

    /// Evicts least recently used entries until the aggregate cost is at most `limit`.
    pub fn trim_to_cost(&self, limit: u64) {
        self.trim(TrimTarget::Cost(limit));
    }

    /// Evicts entries not accessed within `limit` of now.
    pub fn trim_to_age(&self, limit: Duration) {
        self.trim(TrimTarget::Age(limit));
    }

    /// Runs one eviction policy on the calling thread.
    pub fn trim(&self, target: TrimTarget) {
        let now = self.clock.now();
        let (backoff, release_async) = {
            let state = self.state.lock();
            (state.config.trim_backoff, state.config.release_asynchronously)
        };
        let evicted = policy::trim(&self.state, &self.metrics, target, now, backoff);
        if !evicted.is_empty() {
            self.release(evicted, release_async);
        }
    }

    // --- Stats ---

    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().index.is_empty()
    }

    pub fn total_cost(&self) -> u64 {
        self.state.lock().index.total_cost()
    }

    /// Keys from most to least recently used.
    pub fn keys_mru(&self) -> Vec<K> {
        self.state.lock().index.keys_mru()
    }

    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// # Errors
    /// Returns [`CacheError::Corrupted`] if the index and its aggregates disagree.
    pub fn check_invariants(&self) -> Result<(), CacheError> {
        self.state.lock().index.check_invariants()
    }

    pub fn auto_trim_state(&self) -> AutoTrimState {
        self.auto_trim.state()
    }

    // --- Runtime config ---

    /// Snapshot of the current configuration.
    pub fn config(&self) -> CacheConfig {
        self.state.lock().config.clone()
    }

    pub fn count_limit(&self) -> usize {
        self.state.lock().config.count_limit
    }

    pub fn set_count_limit(&self, limit: usize) {
        self.state.lock().config.count_limit = limit;
    }

    pub fn cost_limit(&self) -> u64 {
        self.state.lock().config.cost_limit
    }

    pub fn set_cost_limit(&self, limit: u64) {
        self.state.lock().config.cost_limit = limit;
    }

    pub fn age_limit(&self) -> Duration {
        self.state.lock().config.age_limit
    }

    pub fn set_age_limit(&self, limit: Duration) {
        self.state.lock().config.age_limit = limit;
    }

    pub fn auto_trim_interval(&self) -> Duration {
        self.state.lock().config.auto_trim_interval
    }

    /// `Duration::MAX` (or zero) disables the cycle at its next tick. Any finite interval
    /// re-arms the cycle now, superseding an already armed tick.
    pub fn set_auto_trim_interval(&self, interval: Duration) {
        let interval = normalize_interval(interval);
        self.state.lock().config.auto_trim_interval = interval;
        if interval != Duration::MAX {
            self.arm_auto_trim(interval);
        }
    }

    pub fn set_remove_all_on_memory_pressure(&self, enabled: bool) {
        self.state.lock().config.remove_all_on_memory_pressure = enabled;
    }

    pub fn set_remove_all_on_enter_background(&self, enabled: bool) {
        self.state.lock().config.remove_all_on_enter_background = enabled;
    }

    pub fn set_release_asynchronously(&self, enabled: bool) {
        self.state.lock().config.release_asynchronously = enabled;
    }

    pub fn set_trim_backoff(&self, backoff: Duration) {
        self.state.lock().config.trim_backoff = normalize_backoff(backoff);
    }

    pub fn set_release_executor(&self, executor: Arc<dyn Executor>) {
        *self.release_executor.write() = executor;
    }

    pub fn set_on_memory_pressure(&self, hook: Option<CacheHook<K, V>>) {
        *self.on_memory_pressure.write() = hook;
    }

    pub fn set_on_enter_background(&self, hook: Option<CacheHook<K, V>>) {
        *self.on_enter_background.write() = hook;
    }

    // --- Lifecycle ---

    /// Subscribes to `source`. The subscription is dropped with the cache.
    pub fn attach(&self, source: Arc<dyn SignalSource>) {
        let observer: Weak<dyn LifecycleObserver> = self.this.clone();
        let id = source.subscribe(observer);
        self.subscriptions.lock().push((source, id));
    }

    /// Runs the memory-pressure hook, then clears the cache if configured to.
    pub fn handle_memory_pressure(&self) {
        log::info!(target: "memtier::lifecycle", "cache {}: memory pressure", self.name);
        let hook = self.on_memory_pressure.read().clone();
        if let Some(hook) = hook {
            hook(self);
        }
        let clear = self.state.lock().config.remove_all_on_memory_pressure;
        if clear {
            self.remove_all();
        }
    }

    /// Runs the enter-background hook, then clears the cache if configured to.
    pub fn handle_enter_background(&self) {
        log::info!(target: "memtier::lifecycle", "cache {}: entering background", self.name);
        let hook = self.on_enter_background.read().clone();
        if let Some(hook) = hook {
            hook(self);
        }
        let clear = self.state.lock().config.remove_all_on_enter_background;
        if clear {
            self.remove_all();
        }
    }

    // --- Internals ---

    fn release<T: Send + 'static>(&self, doomed: T, asynchronously: bool) {
        if asynchronously {
            let executor = self.release_executor.read().clone();
            executor.execute(Box::new(move || drop(doomed)));
        } else {
            drop(doomed);
        }
    }

    /// Queues one background cost trim unless one is already queued.
    fn schedule_cost_trim(&self) {
        if self.cost_trim_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = self.this.clone();
        self.executor.execute(Box::new(move || {
            if let Some(cache) = weak.upgrade() {
                cache.cost_trim_pending.store(false, Ordering::Release);
                let limit = cache.cost_limit();
                cache.trim_to_cost(limit);
            }
        }));
    }

    fn arm_auto_trim(&self, delay: Duration) {
        let epoch = self.auto_trim.arm();
        log::trace!(target: "memtier::scheduler", "cache {}: auto-trim armed (epoch {epoch}, {delay:?})", self.name);
        self.schedule_tick(epoch, delay);
    }

    fn schedule_tick(&self, epoch: u64, delay: Duration) {
        let weak = self.this.clone();
        self.executor.execute_after(
            delay,
            Box::new(move || {
                if let Some(cache) = weak.upgrade() {
                    cache.run_auto_trim_tick(epoch);
                }
            }),
        );
    }

    fn run_auto_trim_tick(&self, epoch: u64) {
        if !self.auto_trim.begin_tick(epoch) {
            log::trace!(target: "memtier::scheduler", "cache {}: stale tick (epoch {epoch})", self.name);
            return;
        }
        let (interval, count, cost, age) = {
            let state = self.state.lock();
            let c = &state.config;
            (c.auto_trim_interval, c.count_limit, c.cost_limit, c.age_limit)
        };
        if interval != Duration::MAX {
            self.trim_to_cost(cost);
            self.trim_to_count(count);
            self.trim_to_age(age);
        }
        let interval = self.auto_trim_interval();
        if self.auto_trim.finish_tick(epoch, interval != Duration::MAX) {
            self.schedule_tick(epoch, interval);
        } else {
            log::trace!(target: "memtier::scheduler", "cache {}: auto-trim chain {epoch} ended", self.name);
        }
    }
}

impl<K, V> LifecycleObserver for MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn on_signal(&self, signal: LifecycleSignal) {
        match signal {
            LifecycleSignal::MemoryPressure => self.handle_memory_pressure(),
            LifecycleSignal::EnterBackground => self.handle_enter_background(),
        }
    }
}

impl<K, V> Drop for MemoryCache<K, V> {
    fn drop(&mut self) {
        self.auto_trim.cancel();
        for (source, id) in self.subscriptions.get_mut().drain(..) {
            source.unsubscribe(id);
        }
        if !self.state.is_poisoned() {
            drop(self.state.lock().index.drain());
        }
        log::debug!("cache {} dropped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::ManualExecutor;

    fn manual(config: CacheConfig) -> (Arc<MemoryCache<String, u32>>, Arc<ManualExecutor>, Arc<ManualClock>) {
        let exec = Arc::new(ManualExecutor::new());
        let clock = Arc::new(ManualClock::new());
        let cache = MemoryCache::builder(config).executor(exec.clone()).clock(clock.clone()).build();
        (cache, exec, clock)
    }

    #[test]
    fn upsert_over_count_limit_evicts_one_inline() {
        let (cache, _exec, _clock) =
            manual(CacheConfig { count_limit: 2, auto_trim_interval: Duration::MAX, ..Default::default() });
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.set("c".into(), 3);
        assert_eq!(cache.keys_mru(), vec!["c".to_string(), "b".to_string()]);
        assert_eq!(cache.metrics_snapshot().count_evictions, 1);
    }

    #[test]
    fn upsert_over_cost_limit_defers_trim_to_executor() {
        let (cache, exec, _clock) =
            manual(CacheConfig { cost_limit: 10, auto_trim_interval: Duration::MAX, ..Default::default() });
        cache.set_with_cost("x".into(), 1, 6);
        cache.set_with_cost("y".into(), 2, 6);
        cache.set_with_cost("z".into(), 3, 6);
        assert_eq!(cache.total_cost(), 18);
        // two overflowing inserts, one queued trim
        assert_eq!(exec.pending(), 1);
        exec.run_pending();
        assert_eq!(cache.total_cost(), 6);
        assert_eq!(cache.keys_mru(), vec!["z".to_string()]);
    }

    #[test]
    fn none_value_removes() {
        let (cache, _exec, _clock) = manual(CacheConfig::default());
        cache.set("k".into(), 1);
        cache.upsert("k".into(), None, 0);
        assert!(!cache.contains(&"k".to_string()));
        assert!(!cache.remove(&"k".to_string()));
    }

    #[test]
    fn get_refreshes_access_time() {
        let (cache, _exec, clock) = manual(CacheConfig::default());
        cache.set("k".into(), 1);
        clock.advance(Duration::from_secs(4));
        assert_eq!(cache.get(&"k".to_string()), Some(1));
        clock.advance(Duration::from_secs(4));
        cache.trim_to_age(Duration::from_secs(5));
        assert!(cache.contains(&"k".to_string()));
    }

    #[test]
    fn drop_cancels_auto_trim_and_unsubscribes() {
        let hub = Arc::new(crate::lifecycle::LifecycleHub::new());
        let exec = Arc::new(ManualExecutor::new());
        let cache: Arc<MemoryCache<String, u32>> = MemoryCache::builder(CacheConfig::default())
            .executor(exec.clone())
            .signal_source(hub.clone())
            .build();
        assert_eq!(cache.auto_trim_state(), AutoTrimState::Scheduled);
        assert_eq!(hub.subscriber_count(), 1);
        drop(cache);
        assert_eq!(hub.subscriber_count(), 0);
        // the armed tick still fires but finds nothing to run against
        assert_eq!(exec.fire_timers(), 1);
        assert_eq!(exec.pending_timers(), 0);
    }
}
