//! Single mutual-exclusion lock guarding the index, aggregates and runtime config.
//!
//! Two acquisition disciplines:
//! - blocking (`lock`) for foreground operations, which each hold the lock for O(1) work;
//! - cooperative (`lock_cooperative`) for background sweeps, which retry a bounded timed
//!   acquisition and hand the lock straight back to any waiter via `unlock_fair` after
//!   every single eviction.
//!
//! `parking_lot` mutexes do not poison. A guard taken before a panic and dropped during the
//! unwind marks the lock poisoned here, and every later acquisition panics: the index may be half-updated
//! and there is no way to repair it.

use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct IndexLock<T> {
    inner: Mutex<T>,
    poisoned: AtomicBool,
}

impl<T> IndexLock<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Mutex::new(value), poisoned: AtomicBool::new(false) }
    }

    /// Blocking acquisition.
    ///
    /// # Panics
    /// Panics if a previous holder panicked while holding the lock.
    pub fn lock(&self) -> IndexGuard<'_, T> {
        self.admit(self.inner.lock())
    }

    /// Single non-blocking attempt.
    ///
    /// # Panics
    /// Panics if a previous holder panicked while holding the lock.
    pub fn try_lock(&self) -> Option<IndexGuard<'_, T>> {
        self.inner.try_lock().map(|g| self.admit(g))
    }

    /// Cooperative acquisition for background work: one non-blocking attempt, then timed
    /// attempts of at most `backoff` each until the lock is free. `on_contended` runs once
    /// per failed attempt.
    ///
    /// # Panics
    /// Panics if a previous holder panicked while holding the lock.
    pub fn lock_cooperative(
        &self,
        backoff: Duration,
        mut on_contended: impl FnMut(),
    ) -> IndexGuard<'_, T> {
        if let Some(g) = self.inner.try_lock() {
            return self.admit(g);
        }
        loop {
            on_contended();
            if let Some(g) = self.inner.try_lock_for(backoff) {
                return self.admit(g);
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn admit<'a>(&'a self, guard: MutexGuard<'a, T>) -> IndexGuard<'a, T> {
        if self.is_poisoned() {
            drop(guard);
            panic!("memtier: cache lock poisoned by a panic in another thread; cache state is unrecoverable");
        }
        let sentinel = PanicSentinel { flag: &self.poisoned, was_panicking: std::thread::panicking() };
        IndexGuard { sentinel, guard }
    }
}

impl<T: Default> Default for IndexLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// Locks taken inside a `Drop` that runs during an unrelated unwind do not poison.
struct PanicSentinel<'a> {
    flag: &'a AtomicBool,
    was_panicking: bool,
}

impl Drop for PanicSentinel<'_> {
    fn drop(&mut self) {
        if !self.was_panicking && std::thread::panicking() {
            self.flag.store(true, Ordering::Release);
        }
    }
}

/// Guard over the locked state. Field order matters: the sentinel drops, and records a
/// panic, before the mutex is released.
pub struct IndexGuard<'a, T> {
    sentinel: PanicSentinel<'a>,
    guard: MutexGuard<'a, T>,
}

impl<T> IndexGuard<'_, T> {
    /// Releases the lock, handing it directly to a waiting thread if there is one.
    pub fn unlock_fair(self) {
        let IndexGuard { sentinel, guard } = self;
        drop(sentinel);
        MutexGuard::unlock_fair(guard);
    }
}

impl<T> Deref for IndexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IndexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
