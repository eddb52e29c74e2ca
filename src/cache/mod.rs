mod config;
mod core;
mod index;
mod lock;
mod metrics;
mod policy;
mod scheduler;

pub use config::{CacheConfig, CacheConfigFile};
pub use core::{CacheBuilder, CacheHook, MemoryCache};
pub use index::{Entry, Iter, OrderedIndex};
pub use lock::{IndexGuard, IndexLock};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use policy::TrimTarget;
pub use scheduler::AutoTrimState;
