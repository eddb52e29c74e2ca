//! Host lifecycle signals (memory pressure, entering background).
//!
//! The host owns a [`SignalSource`], typically a [`LifecycleHub`], and drives it from
//! whatever platform mechanism it has. Caches subscribe with a weak observer, so a
//! subscription never keeps a cache alive.

use parking_lot::RwLock;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    MemoryPressure,
    EnterBackground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiver of lifecycle signals. Called on whatever thread delivers the signal.
pub trait LifecycleObserver: Send + Sync {
    fn on_signal(&self, signal: LifecycleSignal);
}

/// Subscribe/unsubscribe surface a cache needs from the host.
pub trait SignalSource: Send + Sync {
    fn subscribe(&self, observer: Weak<dyn LifecycleObserver>) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-process broadcaster for lifecycle signals.
#[derive(Default)]
pub struct LifecycleHub {
    next_id: AtomicU64,
    observers: RwLock<Vec<(SubscriptionId, Weak<dyn LifecycleObserver>)>>,
}

impl LifecycleHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions. Observers that have been dropped are not counted.
    pub fn subscriber_count(&self) -> usize {
        self.observers.read().iter().filter(|(_, o)| o.strong_count() > 0).count()
    }

    /// Delivers `signal` to every live observer. Returns how many were notified.
    ///
    /// Observers run without the hub lock held, so they may subscribe or unsubscribe.
    pub fn notify(&self, signal: LifecycleSignal) -> usize {
        let live: Vec<_> = {
            let mut observers = self.observers.write();
            observers.retain(|(_, o)| o.strong_count() > 0);
            observers.iter().filter_map(|(_, o)| o.upgrade()).collect()
        };
        log::debug!(target: "memtier::lifecycle", "delivering {signal:?} to {} observers", live.len());
        for observer in &live {
            observer.on_signal(signal);
        }
        live.len()
    }

    pub fn notify_memory_pressure(&self) -> usize {
        self.notify(LifecycleSignal::MemoryPressure)
    }

    pub fn notify_enter_background(&self) -> usize {
        self.notify(LifecycleSignal::EnterBackground)
    }
}

impl SignalSource for LifecycleHub {
    fn subscribe(&self, observer: Weak<dyn LifecycleObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.observers.write().retain(|(sid, _)| *sid != id);
    }
}
