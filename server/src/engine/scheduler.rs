use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// A one-shot deferred task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Timer collaborator for delayed, best-effort deliveries.
pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, delay: Duration, task: Task);

    /// Drop every pending task without running it.
    fn cancel_all(&self);
}

/// Runs tasks on a tokio runtime after sleeping for the delay.
pub struct TokioScheduler {
    handle: Handle,
    cancel: CancellationToken,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            cancel: CancellationToken::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) {
        let cancel = self.cancel.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => task(),
            }
        });
    }

    fn cancel_all(&self) {
        self.cancel.cancel();
    }
}

/// Virtual-clock scheduler advanced explicitly by the caller, for tick-driven
/// loops and tests.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    pending: Vec<(Duration, Task)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Move the clock forward and run every task that came due, in due order.
    /// Returns how many ran.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut state = self.state.lock();
            state.now += by;
            let now = state.now;
            let (mut due, rest): (Vec<_>, Vec<_>) =
                state.pending.drain(..).partition(|(at, _)| *at <= now);
            state.pending = rest;
            due.sort_by_key(|(at, _)| *at);
            due
        };

        // Run outside the lock so tasks may schedule again.
        let count = due.len();
        for (_, task) in due {
            task();
        }
        count
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) {
        let mut state = self.state.lock();
        let at = state.now + delay;
        state.pending.push((at, task));
    }

    fn cancel_all(&self) {
        self.state.lock().pending.clear();
    }
}
