use memtier::{CacheConfig, LifecycleHub, ManualExecutor, MemoryCache};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn config() -> CacheConfig {
    CacheConfig { auto_trim_interval: Duration::MAX, release_asynchronously: false, ..Default::default() }
}

fn filled(hub: &Arc<LifecycleHub>, config: CacheConfig) -> Arc<MemoryCache<u32, u32>> {
    let cache = MemoryCache::builder(config)
        .executor(Arc::new(ManualExecutor::new()))
        .signal_source(hub.clone())
        .build();
    for i in 0..5 {
        cache.set(i, i);
    }
    cache
}

#[test]
fn memory_pressure_clears_by_default() {
    let hub = Arc::new(LifecycleHub::new());
    let cache = filled(&hub, config());
    assert_eq!(hub.notify_memory_pressure(), 1);
    assert!(cache.is_empty());
    assert_eq!(cache.metrics_snapshot().clears, 1);
}

#[test]
fn enter_background_respects_flag() {
    let hub = Arc::new(LifecycleHub::new());
    let cache = filled(&hub, CacheConfig { remove_all_on_enter_background: false, ..config() });
    hub.notify_enter_background();
    assert_eq!(cache.len(), 5);
    cache.set_remove_all_on_enter_background(true);
    hub.notify_enter_background();
    assert!(cache.is_empty());
}

#[test]
fn hook_runs_before_clear_and_may_reenter() {
    let hub = Arc::new(LifecycleHub::new());
    let seen = Arc::new(AtomicUsize::new(0));
    let s = seen.clone();
    let cache = MemoryCache::<u32, u32>::builder(config())
        .signal_source(hub.clone())
        .on_memory_pressure(move |c| {
            s.store(c.len(), Ordering::SeqCst);
            c.set(100, 100);
        })
        .build();
    cache.set(1, 1);
    cache.set(2, 2);
    hub.notify_memory_pressure();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    // the entry the hook added is cleared along with the rest
    assert!(cache.is_empty());
}

#[test]
fn hook_without_clear_keeps_entries() {
    let hub = Arc::new(LifecycleHub::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = filled(&hub, CacheConfig { remove_all_on_memory_pressure: false, ..config() });
    let c = calls.clone();
    cache.set_on_memory_pressure(Some(Arc::new(move |cache: &MemoryCache<u32, u32>| {
        c.fetch_add(1, Ordering::SeqCst);
        cache.trim_to_count(2);
    })));
    hub.notify_memory_pressure();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 2);
    cache.set_on_memory_pressure(None);
    hub.notify_memory_pressure();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn background_hook_fires_on_direct_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let cache = MemoryCache::<u32, u32>::builder(config())
        .on_enter_background(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    cache.set(1, 1);
    cache.handle_enter_background();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty());
}

#[test]
fn several_caches_share_one_hub() {
    let hub = Arc::new(LifecycleHub::new());
    let a = filled(&hub, config());
    let b = filled(&hub, CacheConfig { remove_all_on_memory_pressure: false, ..config() });
    assert_eq!(hub.notify_memory_pressure(), 2);
    assert!(a.is_empty());
    assert_eq!(b.len(), 5);
}

#[test]
fn dropped_cache_unsubscribes() {
    let hub = Arc::new(LifecycleHub::new());
    let cache = filled(&hub, config());
    let other = Arc::new(LifecycleHub::new());
    cache.attach(other.clone());
    assert_eq!((hub.subscriber_count(), other.subscriber_count()), (1, 1));
    drop(cache);
    assert_eq!((hub.subscriber_count(), other.subscriber_count()), (0, 0));
    assert_eq!(hub.notify_memory_pressure(), 0);
}
