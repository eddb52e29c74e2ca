//! In-process, thread-safe memory cache bounded by entry count, aggregate cost and
//! entry age, with least-recently-used eviction.
//!
//! ```no_run
//! use memtier::{CacheConfig, MemoryCache};
//!
//! let cache = MemoryCache::with_config(CacheConfig { count_limit: 1_000, ..CacheConfig::named("thumbs") });
//! cache.set_with_cost("a".to_string(), vec![0u8; 512], 512);
//! assert!(cache.contains(&"a".to_string()));
//! ```

pub mod cache;
pub mod cli;
pub mod clock;
pub mod errors;
pub mod executor;
pub mod lifecycle;
pub mod logger;
pub mod registry;
pub mod utils;

pub use cache::{
    AutoTrimState, CacheBuilder, CacheConfig, CacheConfigFile, CacheHook, CacheMetricsSnapshot,
    MemoryCache, TrimTarget,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::CacheError;
pub use executor::{Executor, Job, ManualExecutor, SerialQueue, TokioExecutor};
pub use lifecycle::{LifecycleHub, LifecycleObserver, LifecycleSignal, SignalSource, SubscriptionId};
pub use registry::CacheRegistry;
