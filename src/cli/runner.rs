use crate::cache::{CacheConfig, CacheMetricsSnapshot, MemoryCache};
use crate::executor::SerialQueue;
use rand::Rng;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::command::Command;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub inserted: usize,
    pub elapsed_ms: f64,
    pub ops_per_sec: f64,
    pub final_count: usize,
    pub final_cost: u64,
    pub metrics: CacheMetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub threads: usize,
    pub ops: usize,
    pub elapsed_ms: f64,
    pub final_count: usize,
    pub final_cost: u64,
    pub consistent: bool,
    pub metrics: CacheMetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
struct ConfigReport<'a> {
    name: &'a str,
    count_limit: Option<usize>,
    cost_limit: Option<u64>,
    age_limit_secs: Option<f64>,
    auto_trim_interval_secs: Option<f64>,
    remove_all_on_memory_pressure: bool,
    remove_all_on_enter_background: bool,
    release_asynchronously: bool,
    trim_backoff_ms: u128,
}

fn finite_secs(d: Duration) -> Option<f64> {
    (d != Duration::MAX).then(|| d.as_secs_f64())
}

fn config_report(cfg: &CacheConfig) -> ConfigReport<'_> {
    ConfigReport {
        name: &cfg.name,
        count_limit: (cfg.count_limit != usize::MAX).then_some(cfg.count_limit),
        cost_limit: (cfg.cost_limit != u64::MAX).then_some(cfg.cost_limit),
        age_limit_secs: finite_secs(cfg.age_limit),
        auto_trim_interval_secs: finite_secs(cfg.auto_trim_interval),
        remove_all_on_memory_pressure: cfg.remove_all_on_memory_pressure,
        remove_all_on_enter_background: cfg.remove_all_on_enter_background,
        release_asynchronously: cfg.release_asynchronously,
        trim_backoff_ms: cfg.trim_backoff.as_millis(),
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Fills a fresh cache with `count` values and trims it to its configured limits.
pub fn bench(config: CacheConfig, count: usize, value_len: usize) -> BenchReport {
    let queue: Arc<SerialQueue> = Arc::new(SerialQueue::new("memtier-bench"));
    let cache: Arc<MemoryCache<String, String>> =
        MemoryCache::builder(config).executor(queue).build();
    let value = "x".repeat(value_len);
    let cost = u64::try_from(value_len).unwrap_or(u64::MAX);
    let start = Instant::now();
    for i in 0..count {
        cache.set_with_cost(format!("key-{i}"), value.clone(), cost);
    }
    cache.trim_to_cost(cache.cost_limit());
    cache.trim_to_count(cache.count_limit());
    let elapsed = start.elapsed();
    let secs = elapsed.as_secs_f64();
    crate::dev6!(
        "{{\"bench\":\"cache\",\"op\":\"fill\",\"n\":{},\"ms\":{:.3}}}",
        count,
        secs * 1000.0
    );
    BenchReport {
        inserted: count,
        elapsed_ms: secs * 1000.0,
        ops_per_sec: if secs > 0.0 { count as f64 / secs } else { 0.0 },
        final_count: cache.len(),
        final_cost: cache.total_cost(),
        metrics: cache.metrics_snapshot(),
    }
}

/// Hammers one cache from `threads` workers, then checks the index against its aggregates.
pub fn stress(config: CacheConfig, threads: usize, ops: usize, keys: usize) -> StressReport {
    let queue: Arc<SerialQueue> = Arc::new(SerialQueue::new("memtier-stress"));
    let cache: Arc<MemoryCache<u64, u64>> = MemoryCache::builder(config).executor(queue).build();
    let keys = u64::try_from(keys.max(1)).unwrap_or(u64::MAX);
    let start = Instant::now();
    let workers: Vec<_> = (0..threads.max(1))
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..ops {
                    let key = rng.random_range(0..keys);
                    match rng.random_range(0..10u8) {
                        0..=4 => cache.set_with_cost(key, key, rng.random_range(0..16)),
                        5..=7 => {
                            cache.get(&key);
                        }
                        _ => {
                            cache.remove(&key);
                        }
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        if worker.join().is_err() {
            log::error!("stress worker panicked");
        }
    }
    let elapsed = elapsed_ms(start);
    let consistent = match cache.check_invariants() {
        Ok(()) => true,
        Err(e) => {
            log::error!("stress run left an inconsistent cache: {e}");
            false
        }
    };
    StressReport {
        threads,
        ops,
        elapsed_ms: elapsed,
        final_count: cache.len(),
        final_cost: cache.total_cost(),
        consistent,
        metrics: cache.metrics_snapshot(),
    }
}

pub fn run(config: CacheConfig, cmd: Command) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    run_with_format(config, cmd, OutputMode::Human, &mut stdout.lock())
}

pub fn run_with_format(
    config: CacheConfig,
    cmd: Command,
    mode: OutputMode,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Config => {
            let report = config_report(&config);
            match mode {
                OutputMode::Json => writeln!(out, "{}", serde_json::to_string(&report)?)?,
                OutputMode::Human => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
            }
        }
        Command::Bench { count, value_len } => {
            let report = bench(config, count, value_len);
            match mode {
                OutputMode::Json => writeln!(out, "{}", serde_json::to_string(&report)?)?,
                OutputMode::Human => {
                    writeln!(
                        out,
                        "inserted {} values in {:.3} ms ({:.0} ops/s); {} remain, cost {}",
                        report.inserted,
                        report.elapsed_ms,
                        report.ops_per_sec,
                        report.final_count,
                        report.final_cost
                    )?;
                    writeln!(out, "{}", serde_json::to_string_pretty(&report.metrics)?)?;
                }
            }
        }
        Command::Stress { threads, ops, keys } => {
            let report = stress(config, threads, ops, keys);
            match mode {
                OutputMode::Json => writeln!(out, "{}", serde_json::to_string(&report)?)?,
                OutputMode::Human => writeln!(
                    out,
                    "{} threads x {} ops in {:.3} ms; {} entries, cost {}, consistent={}",
                    report.threads,
                    report.ops,
                    report.elapsed_ms,
                    report.final_count,
                    report.final_cost,
                    report.consistent
                )?,
            }
            if !report.consistent {
                return Err("cache invariants violated after stress run".into());
            }
        }
    }
    Ok(())
}
