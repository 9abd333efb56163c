//! The Supervisor module manages the lifecycle of the herald process.
//!
//! The [`Supervisor`] owns the store, the sender registry and every service
//! built on top of them. It runs the dispatcher loop and the events worker as
//! periodic tasks, listens for shutdown signals, and performs a bounded
//! graceful shutdown: each loop finishes the unit of work it is in before
//! exiting, and loops that overrun the shutdown timeout are aborted.

mod builder;

use std::sync::Arc;

pub use builder::SupervisorBuilder;
use chrono::Utc;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    contacts::ContactService,
    engine::{
        dispatcher::Dispatcher, events_worker::EventsWorker, lock_manager::TriggerLockManager,
    },
    persistence::traits::Store,
    senders::{SenderError, SenderRegistry},
    worker::PeriodicTask,
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// A store was not provided to the `SupervisorBuilder`.
    #[error("Missing store for Supervisor")]
    MissingStore,

    /// A sender could not be initialised or a contact type has no sender.
    #[error("Sender configuration error: {0}")]
    SenderConfig(#[from] SenderError),
}

/// The primary runtime manager for the application.
pub struct Supervisor<S: Store> {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// The persistent store shared by every service.
    store: Arc<S>,

    /// Senders keyed by contact type.
    registry: Arc<SenderRegistry>,

    /// Delivers due notifications.
    dispatcher: Arc<Dispatcher<S>>,

    /// Drains the event queue into the notification queue.
    events_worker: Arc<EventsWorker<S>>,

    /// Contact management on top of the same store and registry.
    contacts: Arc<ContactService<S>>,

    /// Trigger check leases for checkers sharing this store.
    lock_manager: Arc<TriggerLockManager<S>>,

    /// A token used to signal a graceful shutdown to all supervised tasks.
    cancellation_token: CancellationToken,

    /// Auxiliary tasks such as the signal listener.
    join_set: tokio::task::JoinSet<()>,
}

impl<S: Store> Supervisor<S> {
    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder<S> {
        SupervisorBuilder::new()
    }

    /// Returns the shared store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the sender registry.
    pub fn registry(&self) -> &Arc<SenderRegistry> {
        &self.registry
    }

    /// Returns the contact service.
    pub fn contacts(&self) -> &Arc<ContactService<S>> {
        &self.contacts
    }

    /// Returns the trigger lock manager.
    pub fn lock_manager(&self) -> &Arc<TriggerLockManager<S>> {
        &self.lock_manager
    }

    /// Returns the application configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns a token that stops the supervisor when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Starts the managed loops and blocks until shutdown completes.
    ///
    /// Shutdown starts on SIGINT, SIGTERM, or when the token returned by
    /// [`Supervisor::shutdown_token`] is cancelled.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();

        self.join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler")
                    .recv()
                    .await;
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
                _ = cancellation_token.cancelled() => {}
            }

            cancellation_token.cancel();
        });

        let dispatcher = Arc::clone(&self.dispatcher);
        let dispatcher_task = PeriodicTask::spawn(
            "dispatcher",
            self.config.dispatcher.poll_interval,
            &self.cancellation_token,
            move || {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    match dispatcher.run_cycle(Utc::now()).await {
                        Ok(report) if report.popped > 0 => {
                            tracing::debug!(?report, "Dispatch cycle completed.")
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Dispatch cycle failed."),
                    }
                }
            },
        );

        let events_worker = Arc::clone(&self.events_worker);
        let events_task = PeriodicTask::spawn(
            "events-worker",
            self.config.events_worker.poll_interval,
            &self.cancellation_token,
            move || {
                let events_worker = Arc::clone(&events_worker);
                async move {
                    if let Err(e) = events_worker.tick(Utc::now()).await {
                        tracing::error!(error = %e, "Events worker tick failed.");
                    }
                }
            },
        );

        tracing::info!(
            contact_types = ?self.registry.contact_types(),
            "Supervisor started."
        );

        self.cancellation_token.cancelled().await;

        let shutdown_timeout = self.config.shutdown_timeout;
        let tasks = [events_task, dispatcher_task];
        for task in &tasks {
            task.stop();
        }
        let stopped = futures::future::join_all(tasks.into_iter().map(|task| async move {
            let name = task.name().to_string();
            (name, task.wait(shutdown_timeout).await)
        }))
        .await;
        for (name, result) in stopped {
            match result {
                Ok(()) => tracing::info!(task = %name, "Task stopped."),
                Err(e) => tracing::warn!(error = %e, "Task did not stop cleanly."),
            }
        }

        self.join_set.shutdown().await;
        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }
}
