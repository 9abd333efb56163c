//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{Supervisor, SupervisorError};
use crate::{
    config::AppConfig,
    contacts::ContactService,
    engine::{
        dispatcher::Dispatcher,
        events_worker::EventsWorker,
        lock_manager::TriggerLockManager,
        planner::NotificationPlanner,
        reporter::{FailureReporter, TracingReporter},
        scheduler::NotificationScheduler,
        throttle::ThrottleTracker,
    },
    persistence::traits::Store,
    senders::{AttachmentRenderer, NoAttachment, SenderRegistry},
};

/// A builder for creating a `Supervisor` instance.
pub struct SupervisorBuilder<S: Store> {
    config: Option<AppConfig>,
    store: Option<Arc<S>>,
    registry: Option<SenderRegistry>,
    renderer: Option<Arc<dyn AttachmentRenderer>>,
    reporter: Option<Arc<dyn FailureReporter>>,
}

impl<S: Store> Default for SupervisorBuilder<S> {
    fn default() -> Self {
        Self { config: None, store: None, registry: None, renderer: None, reporter: None }
    }
}

impl<S: Store> SupervisorBuilder<S> {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the store for the `Supervisor`.
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a prepared sender registry instead of building one from the
    /// configured sender list.
    pub fn registry(mut self, registry: SenderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the attachment renderer. Defaults to [`NoAttachment`].
    pub fn renderer(mut self, renderer: Arc<dyn AttachmentRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Sets the failure reporter. Defaults to [`TracingReporter`].
    pub fn reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Assembles and validates the components to build a `Supervisor`.
    ///
    /// Every sender is initialised here and every configured contact type must
    /// be served by one of them, so a bad sender configuration fails before
    /// any loop starts.
    pub fn build(self) -> Result<Supervisor<S>, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let store = self.store.ok_or(SupervisorError::MissingStore)?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => SenderRegistry::from_config(&config.senders)?,
        };
        registry.validate(config.contact_types.iter().map(String::as_str))?;
        tracing::info!(contact_types = ?registry.contact_types(), "Senders initialised.");
        let registry = Arc::new(registry);

        let renderer = self.renderer.unwrap_or_else(|| Arc::new(NoAttachment));
        let reporter = self.reporter.unwrap_or_else(|| Arc::new(TracingReporter));

        let scheduler = Arc::new(NotificationScheduler::new(Arc::clone(&store)));
        let throttle =
            Arc::new(ThrottleTracker::new(Arc::clone(&store), config.throttle.clone()));
        let planner = Arc::new(NotificationPlanner::new(
            Arc::clone(&store),
            Arc::clone(&throttle),
            Arc::clone(&scheduler),
        ));
        let events_worker = Arc::new(EventsWorker::new(
            Arc::clone(&store),
            planner,
            config.events_worker.batch_size,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            throttle,
            Arc::clone(&registry),
            renderer,
            reporter,
            config.dispatcher.clone(),
        ));
        let contacts = Arc::new(ContactService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            scheduler,
        ));

        let lock_manager = Arc::new(TriggerLockManager::new(Arc::clone(&store)));

        Ok(Supervisor {
            config: Arc::new(config),
            store,
            registry,
            dispatcher,
            events_worker,
            contacts,
            lock_manager,
            cancellation_token: CancellationToken::new(),
            join_set: tokio::task::JoinSet::new(),
        })
    }
}
