//! Execution contexts for deferred work: auto-trim ticks, background cost trims and
//! release of evicted values.
//!
//! - [`SerialQueue`]: one named worker thread running jobs in order, with a timer heap
//!   for delayed jobs. [`SerialQueue::background`] is the shared default.
//! - [`ManualExecutor`]: jobs wait until the host pumps them. Useful as a
//!   main-thread-affined release context and for deterministic tests.
//! - [`TokioExecutor`]: jobs go to a tokio runtime's blocking pool.

use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, LazyLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run work now or later.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
    fn execute_after(&self, delay: Duration, job: Job);
}

enum Message {
    Run { at: Instant, job: Job },
    Shutdown,
}

struct Timer {
    at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Timer {}
impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

static BACKGROUND: LazyLock<Arc<SerialQueue>> =
    LazyLock::new(|| Arc::new(SerialQueue::new("memtier-background")));

/// Serial job queue backed by a single worker thread.
pub struct SerialQueue {
    name: String,
    tx: Sender<Message>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue").field("name", &self.name).finish()
    }
}

impl SerialQueue {
    /// Spawns the worker thread. If the thread cannot be spawned the queue degrades to
    /// running immediate jobs inline and dropping delayed ones.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Message>();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&rx))
            .map_err(|e| log::error!("failed to spawn executor thread {name}: {e}"))
            .ok();
        Self { name, tx, worker: Mutex::new(worker) }
    }

    /// Process-wide background queue shared by caches that are not given one.
    pub fn background() -> Arc<SerialQueue> {
        BACKGROUND.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Executor for SerialQueue {
    fn execute(&self, job: Job) {
        if let Err(mpsc::SendError(Message::Run { job, .. })) =
            self.tx.send(Message::Run { at: Instant::now(), job })
        {
            run_guarded(job);
        }
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        let at = Instant::now().checked_add(delay).unwrap_or_else(far_future);
        if self.tx.send(Message::Run { at, job }).is_err() {
            log::warn!("executor {} is gone; dropping delayed job", self.name);
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            // Dropped from one of its own jobs: the loop exits on Shutdown by itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365 * 100)
}

fn worker_loop(rx: &Receiver<Message>) {
    let mut timers: BinaryHeap<Reverse<Timer>> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let now = Instant::now();
        while timers.peek().is_some_and(|Reverse(t)| t.at <= now) {
            if let Some(Reverse(t)) = timers.pop() {
                run_guarded(t.job);
            }
        }
        let msg = match timers.peek() {
            Some(Reverse(t)) => {
                match rx.recv_timeout(t.at.saturating_duration_since(Instant::now())) {
                    Ok(m) => m,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(m) => m,
                Err(_) => break,
            },
        };
        match msg {
            Message::Run { at, job } if at <= Instant::now() => run_guarded(job),
            Message::Run { at, job } => {
                seq += 1;
                timers.push(Reverse(Timer { at, seq, job }));
            }
            Message::Shutdown => break,
        }
    }
}

fn run_guarded(job: Job) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
        log::error!("executor job panicked");
    }
}

/// Jobs queue up until the host runs them with [`ManualExecutor::run_pending`] and
/// [`ManualExecutor::fire_timers`]. Delays are recorded, not waited on.
#[derive(Default)]
pub struct ManualExecutor {
    ready: Mutex<VecDeque<Job>>,
    delayed: Mutex<Vec<(Duration, Job)>>,
}

impl ManualExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.ready.lock().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.delayed.lock().len()
    }

    /// Delays of the currently armed timers, in arming order.
    pub fn timer_delays(&self) -> Vec<Duration> {
        self.delayed.lock().iter().map(|(d, _)| *d).collect()
    }

    /// Runs queued jobs, including ones queued by the jobs themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.ready.lock().pop_front();
            match next {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Fires every timer armed before this call as if its delay had elapsed. Timers armed
    /// by the fired jobs wait for the next call. Returns how many fired.
    pub fn fire_timers(&self) -> usize {
        let due = std::mem::take(&mut *self.delayed.lock());
        let fired = due.len();
        for (_, job) in due {
            job();
        }
        fired
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.ready.lock().push_back(job);
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        self.delayed.lock().push((delay, job));
    }
}

/// Runs jobs on a tokio runtime's blocking pool; delayed jobs wait on a tokio timer.
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor for the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) {
        drop(self.handle.spawn_blocking(job));
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        drop(self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tokio::task::spawn_blocking(job).await;
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn serial_queue_runs_in_submission_order() {
        let q = SerialQueue::new("test-serial");
        let (tx, rx) = channel();
        for i in 0..5 {
            let tx = tx.clone();
            q.execute(Box::new(move || tx.send(i).unwrap()));
        }
        let got: Vec<i32> = (0..5).map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn delayed_jobs_fire_after_immediate_ones_and_in_deadline_order() {
        let q = SerialQueue::new("test-timers");
        let (tx, rx) = channel();
        let (t1, t2, t3) = (tx.clone(), tx.clone(), tx);
        q.execute_after(Duration::from_millis(60), Box::new(move || t1.send("late").unwrap()));
        q.execute_after(Duration::from_millis(20), Box::new(move || t2.send("soon").unwrap()));
        q.execute(Box::new(move || t3.send("now").unwrap()));
        let got: Vec<&str> = (0..3).map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap()).collect();
        assert_eq!(got, vec!["now", "soon", "late"]);
    }

    #[test]
    fn panicking_job_does_not_kill_the_worker() {
        let q = SerialQueue::new("test-panic");
        let (tx, rx) = channel();
        q.execute(Box::new(|| panic!("job failure")));
        q.execute(Box::new(move || tx.send(1).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
    }

    #[test]
    fn manual_executor_runs_only_when_pumped() {
        let exec = Arc::new(ManualExecutor::new());
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let h = hits.clone();
        exec.execute(Box::new(move || {
            h.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));
        let (e2, h2) = (exec.clone(), hits.clone());
        exec.execute_after(
            Duration::from_secs(5),
            Box::new(move || {
                h2.fetch_add(10, std::sync::atomic::Ordering::SeqCst);
                e2.execute_after(Duration::from_secs(5), Box::new(|| {}));
            }),
        );
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(exec.timer_delays(), vec![Duration::from_secs(5)]);
        assert_eq!(exec.run_pending(), 1);
        assert_eq!(exec.fire_timers(), 1);
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 11);
        assert_eq!(exec.pending_timers(), 1);
    }
}
