//! `log4rs` setup for hosts that want memtier's logs in files.
//!
//! The library only logs through the `log` facade; nothing here runs unless the host
//! calls it. Targets: `memtier::trim` (sweep summaries, routed to `trim.log`),
//! `memtier::scheduler`, `memtier::lifecycle`, `memtier::dev6`.

use crate::errors::CacheError;
use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

static HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initializes logging from a log4rs YAML/TOML file.
///
/// # Errors
/// Returns [`CacheError::Logger`] if the file is invalid or a logger is already installed.
pub fn init_file(path: &Path) -> Result<(), CacheError> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())
        .map_err(|e| CacheError::Logger(e.to_string()))
}

pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, CacheError> {
    let pattern = base.join(format!("{stem}.{{}}.log"));
    let roller = FixedWindowRoller::builder()
        .build(&pattern.display().to_string(), keep)
        .map_err(|e| CacheError::Logger(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Builds the file configuration: `memtier.log` for everything at `level`, `trim.log`
/// for sweep summaries.
///
/// # Errors
/// Returns an error if the directory or an appender cannot be created.
pub fn build_config(dir: &Path, level: LevelFilter, retention: usize) -> Result<Config, CacheError> {
    std::fs::create_dir_all(dir)?;
    let keep = u32::try_from(retention.max(1)).unwrap_or(u32::MAX);
    Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(dir, "memtier", keep)?)))
        .appender(Appender::builder().build("trim", Box::new(rolling(dir, "trim", keep)?)))
        .logger(Logger::builder().appender("trim").additive(false).build("memtier::trim", level))
        .logger(Logger::builder().additive(false).build("memtier::dev6", LevelFilter::Trace))
        .build(Root::builder().appender("app").build(level))
        .map_err(|e| CacheError::Logger(e.to_string()))
}

/// Configures process-wide file logging. Calling it again replaces the configuration.
///
/// - `dir`: log directory, current directory if `None`
/// - `level`: error|warn|info|debug|trace|off, default info
/// - `retention`: rolled files kept per log, default 7
///
/// # Errors
/// Returns an error if the configuration cannot be built or another logger owns the facade.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<(), CacheError> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let config = build_config(&base, parse_level(level), retention.unwrap_or(7))?;
    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config).map_err(|e| CacheError::Logger(e.to_string()))?;
    let _ = HANDLE.set(handle);
    Ok(())
}

/// [`configure_logging`] driven by `MEMTIER_LOG_DIR`, `MEMTIER_LOG_LEVEL` and
/// `MEMTIER_LOG_RETENTION`.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), CacheError> {
    let dir = std::env::var("MEMTIER_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("MEMTIER_LOG_LEVEL").ok();
    let retention =
        std::env::var("MEMTIER_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(parse_level(None), LevelFilter::Info);
        assert_eq!(parse_level(Some("TRACE")), LevelFilter::Trace);
        assert_eq!(parse_level(Some("bogus")), LevelFilter::Info);
    }

    #[test]
    fn config_builds_and_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        build_config(&logs, LevelFilter::Debug, 3).unwrap();
        assert!(logs.is_dir());
    }

    #[test]
    fn init_file_reports_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = init_file(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, CacheError::Logger(_)));
    }
}
