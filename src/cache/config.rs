use crate::errors::CacheError;
use crate::utils::num::{secs_f64_to_limit, u64_to_usize_saturating};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a cache instance.
///
/// A limit equal to its type's maximum (`usize::MAX`, `u64::MAX`, `Duration::MAX`) is
/// unbounded and disables that policy. A zero limit trims everything.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub name: String,
    pub count_limit: usize,
    pub cost_limit: u64,
    pub age_limit: Duration,
    /// Period of the background trim cycle; `Duration::MAX` disables it.
    pub auto_trim_interval: Duration,
    pub remove_all_on_memory_pressure: bool,
    pub remove_all_on_enter_background: bool,
    /// Drop evicted values on the release executor instead of the calling thread.
    pub release_asynchronously: bool,
    /// Longest single wait of a cooperative lock attempt.
    pub trim_backoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            count_limit: usize::MAX,
            cost_limit: u64::MAX,
            age_limit: Duration::MAX,
            auto_trim_interval: Duration::from_secs(5),
            remove_all_on_memory_pressure: true,
            remove_all_on_enter_background: true,
            release_asynchronously: true,
            trim_backoff: Duration::from_millis(10),
        }
    }
}

/// On-disk form. Durations are floating seconds; omitted fields keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfigFile {
    pub name: Option<String>,
    pub count_limit: Option<u64>,
    pub cost_limit: Option<u64>,
    pub age_limit_secs: Option<f64>,
    pub auto_trim_interval_secs: Option<f64>,
    pub remove_all_on_memory_pressure: Option<bool>,
    pub remove_all_on_enter_background: Option<bool>,
    pub release_asynchronously: Option<bool>,
    pub trim_backoff_ms: Option<u64>,
}

impl CacheConfigFile {
    pub fn apply(self, cfg: &mut CacheConfig) {
        if let Some(v) = self.name {
            cfg.name = v;
        }
        if let Some(v) = self.count_limit {
            cfg.count_limit = u64_to_usize_saturating(v);
        }
        if let Some(v) = self.cost_limit {
            cfg.cost_limit = v;
        }
        if let Some(v) = self.age_limit_secs {
            cfg.age_limit = secs_f64_to_limit(v);
        }
        if let Some(v) = self.auto_trim_interval_secs {
            cfg.auto_trim_interval = normalize_interval(secs_f64_to_limit(v));
        }
        if let Some(v) = self.remove_all_on_memory_pressure {
            cfg.remove_all_on_memory_pressure = v;
        }
        if let Some(v) = self.remove_all_on_enter_background {
            cfg.remove_all_on_enter_background = v;
        }
        if let Some(v) = self.release_asynchronously {
            cfg.release_asynchronously = v;
        }
        if let Some(v) = self.trim_backoff_ms {
            cfg.trim_backoff = normalize_backoff(Duration::from_millis(v));
        }
    }
}

/// A zero interval would spin; it disables the cycle instead.
pub(crate) fn normalize_interval(d: Duration) -> Duration {
    if d.is_zero() { Duration::MAX } else { d }
}

pub(crate) fn normalize_backoff(d: Duration) -> Duration {
    d.max(Duration::from_millis(1))
}

impl CacheConfig {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Parses a TOML document on top of the defaults.
    ///
    /// # Errors
    /// Returns [`CacheError::Config`] on malformed TOML or unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, CacheError> {
        let file: CacheConfigFile = toml::from_str(s)?;
        let mut cfg = Self::default();
        file.apply(&mut cfg);
        Ok(cfg)
    }

    /// Loads a TOML config file on top of the defaults.
    ///
    /// # Errors
    /// Returns [`CacheError::Io`] if the file cannot be read, or [`CacheError::Config`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// `~/.config/memtier.toml` (platform equivalent), if a config dir is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|d| d.join("memtier.toml"))
    }

    /// Overlays environment variables:
    /// - MEMTIER_COUNT_LIMIT
    /// - MEMTIER_COST_LIMIT
    /// - MEMTIER_AGE_LIMIT_SECS
    /// - MEMTIER_AUTO_TRIM_SECS
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfigValue`] if a variable is set but unparsable.
    pub fn apply_env(&mut self) -> Result<(), CacheError> {
        self.apply_vars(|k| std::env::var(k).ok())
    }

    /// Same as [`Self::apply_env`] with an explicit variable lookup.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfigValue`] if a variable is set but unparsable.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), CacheError> {
        fn parse<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, CacheError> {
            raw.trim()
                .parse::<T>()
                .map_err(|_| CacheError::InvalidConfigValue { field, value: raw.to_string() })
        }
        if let Some(raw) = lookup("MEMTIER_COUNT_LIMIT") {
            self.count_limit = u64_to_usize_saturating(parse("MEMTIER_COUNT_LIMIT", &raw)?);
        }
        if let Some(raw) = lookup("MEMTIER_COST_LIMIT") {
            self.cost_limit = parse("MEMTIER_COST_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("MEMTIER_AGE_LIMIT_SECS") {
            self.age_limit = secs_f64_to_limit(parse("MEMTIER_AGE_LIMIT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("MEMTIER_AUTO_TRIM_SECS") {
            self.auto_trim_interval =
                normalize_interval(secs_f64_to_limit(parse("MEMTIER_AUTO_TRIM_SECS", &raw)?));
        }
        Ok(())
    }
}
