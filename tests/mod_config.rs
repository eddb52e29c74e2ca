use memtier::cli::{self, Command, OutputMode};
use memtier::{CacheConfig, CacheError};
use std::io::Write;
use std::time::Duration;

#[test]
fn loads_toml_file_over_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "name = \"avatars\"\ncount_limit = 10\nage_limit_secs = 2.5\nrelease_asynchronously = false"
    )
    .unwrap();
    let cfg = CacheConfig::load(file.path()).unwrap();
    assert_eq!(cfg.name, "avatars");
    assert_eq!(cfg.count_limit, 10);
    assert_eq!(cfg.cost_limit, u64::MAX);
    assert_eq!(cfg.age_limit, Duration::from_millis(2500));
    assert!(!cfg.release_asynchronously);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CacheConfig::load(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, CacheError::Io(_)));
}

#[test]
fn env_overlay_wins_over_file() {
    let mut cfg = CacheConfig::from_toml_str("count_limit = 10\nauto_trim_interval_secs = 1.0").unwrap();
    cfg.apply_vars(|k| match k {
        "MEMTIER_COUNT_LIMIT" => Some("25".into()),
        "MEMTIER_AUTO_TRIM_SECS" => Some("0".into()),
        _ => None,
    })
    .unwrap();
    assert_eq!(cfg.count_limit, 25);
    assert_eq!(cfg.auto_trim_interval, Duration::MAX);
    let err = cfg.apply_vars(|k| (k == "MEMTIER_COST_LIMIT").then(|| "lots".into())).unwrap_err();
    assert!(matches!(err, CacheError::InvalidConfigValue { field: "MEMTIER_COST_LIMIT", .. }));
}

#[test]
fn config_command_prints_json() {
    let mut out = Vec::new();
    let cfg = CacheConfig { count_limit: 7, ..CacheConfig::named("cli") };
    cli::run_with_format(cfg, Command::Config, OutputMode::Json, &mut out).unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["name"], "cli");
    assert_eq!(v["count_limit"], 7);
    assert!(v["cost_limit"].is_null());
    assert_eq!(v["auto_trim_interval_secs"], 5.0);
}

#[test]
fn bench_respects_limits() {
    let cfg = CacheConfig {
        count_limit: 50,
        cost_limit: 1_000,
        auto_trim_interval: Duration::MAX,
        ..CacheConfig::named("bench")
    };
    let report = cli::bench(cfg, 500, 32);
    assert_eq!(report.inserted, 500);
    assert!(report.final_count <= 50);
    assert!(report.final_cost <= 1_000);
    assert_eq!(report.metrics.inserts, 500);
}

#[test]
fn stress_reports_consistency() {
    let cfg = CacheConfig { count_limit: 32, ..CacheConfig::named("stress") };
    let mut out = Vec::new();
    cli::run_with_format(cfg, Command::Stress { threads: 4, ops: 2_000, keys: 64 }, OutputMode::Json, &mut out)
        .unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["consistent"], true);
    assert!(v["final_count"].as_u64().unwrap() <= 32);
}
