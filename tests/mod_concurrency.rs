use memtier::{CacheConfig, MemoryCache, SerialQueue};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn cache(config: CacheConfig) -> Arc<MemoryCache<u64, u64>> {
    MemoryCache::builder(config).executor(Arc::new(SerialQueue::new("test-concurrency"))).build()
}

#[test]
fn disjoint_writers_leave_exact_net_state() {
    let cache = cache(CacheConfig { auto_trim_interval: Duration::MAX, ..Default::default() });
    const THREADS: u64 = 8;
    thread::scope(|s| {
        for t in 0..THREADS {
            let cache = &cache;
            s.spawn(move || {
                let base = t * 1_000;
                for key in base..base + 500 {
                    cache.set_with_cost(key, key, 2);
                }
                for key in (base..base + 500).step_by(2) {
                    assert!(cache.remove(&key));
                }
            });
        }
    });
    assert_eq!(cache.len(), 8 * 250);
    assert_eq!(cache.total_cost(), 8 * 250 * 2);
    cache.check_invariants().unwrap();
}

#[test]
fn overlapping_keys_stay_consistent() {
    let cache = cache(CacheConfig { count_limit: 64, cost_limit: 400, ..Default::default() });
    thread::scope(|s| {
        for _ in 0..8 {
            let cache = &cache;
            s.spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..5_000 {
                    let key = rng.random_range(0..128u64);
                    match rng.random_range(0..4u8) {
                        0 | 1 => cache.set_with_cost(key, key, rng.random_range(0..10)),
                        2 => {
                            if let Some(v) = cache.get(&key) {
                                assert_eq!(v, key);
                            }
                        }
                        _ => {
                            cache.remove(&key);
                        }
                    }
                }
            });
        }
    });
    cache.check_invariants().unwrap();
    assert!(cache.len() <= 64);
    let keys = cache.keys_mru();
    assert_eq!(keys.len(), cache.len());
}

#[test]
fn cost_limit_converges_after_settling() {
    let cache = cache(CacheConfig { cost_limit: 100, ..Default::default() });
    thread::scope(|s| {
        for t in 0..4u64 {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..1_000 {
                    cache.set_with_cost(t * 10_000 + i, i, 3);
                }
            });
        }
    });
    let deadline = Instant::now() + Duration::from_secs(5);
    while cache.total_cost() > 100 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(cache.total_cost() <= 100);
    cache.check_invariants().unwrap();
}

#[test]
fn large_trim_does_not_lock_out_foreground() {
    let cache = cache(CacheConfig {
        auto_trim_interval: Duration::MAX,
        release_asynchronously: false,
        ..Default::default()
    });
    for i in 0..20_000 {
        cache.set(i, i);
    }
    thread::scope(|s| {
        let trimmer = &cache;
        s.spawn(move || trimmer.trim_to_count(10));
        for i in 100_000..100_200 {
            cache.set(i, i);
            cache.get(&i);
        }
    });
    cache.check_invariants().unwrap();
    let m = cache.metrics_snapshot();
    assert!(m.count_evictions >= 19_990);
    assert_eq!(m.hits, 200);
}
