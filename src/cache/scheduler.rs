//! Auto-trim state machine: `Idle → Scheduled → Running → Scheduled → …`.
//!
//! Each arming starts a new chain identified by an epoch. A tick carries the epoch it was
//! armed with; when it fires after the chain was re-armed or cancelled it does nothing,
//! and a running tick that finds itself superseded completes without rescheduling. No
//! timer is ever destroyed, stale ones just fall through.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoTrimState {
    Idle,
    Scheduled,
    Running,
}

#[derive(Debug)]
pub(crate) struct AutoTrim {
    inner: Mutex<(AutoTrimState, u64)>,
}

impl AutoTrim {
    pub(crate) fn new() -> Self {
        Self { inner: Mutex::new((AutoTrimState::Idle, 0)) }
    }

    pub(crate) fn state(&self) -> AutoTrimState {
        self.inner.lock().0
    }

    /// Starts a new chain, superseding any armed or running tick. Returns its epoch.
    pub(crate) fn arm(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.1 = inner.1.wrapping_add(1);
        inner.0 = AutoTrimState::Scheduled;
        inner.1
    }

    pub(crate) fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.1 = inner.1.wrapping_add(1);
        inner.0 = AutoTrimState::Idle;
    }

    /// A tick of chain `epoch` fired. False if that chain is no longer current.
    pub(crate) fn begin_tick(&self, epoch: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.1 != epoch {
            return false;
        }
        inner.0 = AutoTrimState::Running;
        true
    }

    /// A tick of chain `epoch` finished its sweep. True if it should arm the next tick.
    pub(crate) fn finish_tick(&self, epoch: u64, enabled: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.1 != epoch {
            return false;
        }
        inner.0 = if enabled { AutoTrimState::Scheduled } else { AutoTrimState::Idle };
        enabled
    }
}
