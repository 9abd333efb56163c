//! Cancellable periodic background tasks.
//!
//! A [`PeriodicTask`] runs a tick function on a fixed interval until its
//! cancellation token fires. A tick that is already running is allowed to
//! finish, so stopping a task never interrupts a half-done unit of work.

use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Errors returned while waiting for a periodic task to exit.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The task did not exit within the allotted time and was aborted.
    #[error("Task '{0}' did not stop within {1:?}")]
    StopTimeout(String, Duration),

    /// The task panicked.
    #[error("Task '{0}' panicked: {1}")]
    Panicked(String, String),
}

/// A named loop ticking at a fixed interval until stopped.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns a task calling `tick` every `interval`. The first tick runs
    /// immediately. The task also stops when `parent` is cancelled.
    pub fn spawn<F, Fut>(
        name: impl Into<String>,
        interval: Duration,
        parent: &CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let token = parent.child_token();
        let loop_token = token.clone();
        let loop_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(task = %loop_name, ?interval, "Periodic task started.");
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
            tracing::info!(task = %loop_name, "Periodic task stopped.");
        });

        Self { name, token, handle }
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signals the task to exit after its current tick.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns true once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits up to `timeout` for the task to exit. The task is aborted if it
    /// is still running when the timeout elapses.
    pub async fn wait(self, timeout: Duration) -> Result<(), WorkerError> {
        let Self { name, handle, .. } = self;
        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_cancelled() => Ok(()),
            Ok(Err(e)) => Err(WorkerError::Panicked(name, e.to_string())),
            Err(_) => {
                abort.abort();
                tracing::warn!(task = %name, ?timeout, "Periodic task did not stop in time, aborted.");
                Err(WorkerError::StopTimeout(name, timeout))
            }
        }
    }
}
