//! Scheduled background tasks with explicit cancel handles.
//!
//! # Responsibilities
//! - Run a closure on a fixed interval (token refresh, query refetch)
//! - Run a long-lived worker until cancelled (offline replay)
//! - Stop cleanly when cancelled or dropped

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a spawned background task. Dropping it cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `tick` every `period`, starting one period from now.
    ///
    /// A tick that is still running delays the next one; ticks never overlap.
    /// A zero period schedules nothing and returns an already-cancelled handle.
    pub fn every<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            tracing::warn!(task = name, "Zero period, task not scheduled");
            let task = Self::spawn(name, |_| async {});
            task.cancel.cancel();
            return task;
        }

        Self::spawn(name, move |cancel| async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }
        })
    }

    /// Spawn a worker that receives the task's cancellation token.
    pub fn spawn<F, Fut>(name: &'static str, worker: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker(cancel.clone()));
        tracing::debug!(task = name, "Scheduled task started");
        Self { name, cancel, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(task = self.name, "Scheduled task cancelled");
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
