//! Drives one asynchronous operation at a time through the lifecycle
//!
//! ```ignore
//! let runner = AsyncOperationRunner::<Record>::new();
//!
//! // `Started` is applied before `run` returns
//! let mut handle = runner.run(supplier.supply("007")).await?;
//! assert_eq!(runner.status(), LifecycleStatus::Pending);
//!
//! handle.wait().await;
//! assert_eq!(runner.status(), LifecycleStatus::Resolved);
//! ```

use crate::dispatch::{Delivery, Dispatch, Lifeline, SafeDispatcher, Ticket};
use crate::error::{RunnerError, StoreError};
use crate::store::Store;
use crate::{EffectHandle, RunnerConfig};
use async_lifecycle_core::async_effect;
use async_lifecycle_core::failure::{FailureSource, OperationFailure};
use async_lifecycle_core::lifecycle::{
    LifecycleEvent, LifecycleReducer, LifecycleSnapshot, LifecycleState, LifecycleStatus,
    TaggedEvent,
};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

type LifecycleStore<T> =
    Store<LifecycleState<T>, LifecycleEvent<T>, (), LifecycleReducer<T>>;

/// Raw dispatch into the lifecycle store that republishes the snapshot
///
/// The snapshot is published under the store's write lock, so the watch
/// channel always ends on the state the last applied event produced.
struct LifecycleSink<T> {
    store: LifecycleStore<T>,
    snapshots: Arc<watch::Sender<LifecycleSnapshot<T>>>,
}

impl<T> Dispatch<LifecycleEvent<T>> for LifecycleSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn dispatch_guarded<'a>(
        &'a self,
        action: LifecycleEvent<T>,
        guard: &'a (dyn Fn() -> bool + Sync),
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let tag = action.tag();
            let snapshots = &self.snapshots;
            let handle = self
                .store
                .send_if_observed(action, guard, |state| {
                    let snapshot = LifecycleSnapshot::from(state);
                    tracing::debug!(
                        event = tag,
                        status = %snapshot.status,
                        "Lifecycle transition"
                    );
                    snapshots.send_replace(snapshot);
                })
                .await?;
            Ok(handle.is_some())
        })
    }
}

/// Handle to one `run` call
///
/// Waiting observes settlement; dropping the handle cancels nothing.
#[derive(Debug, Clone)]
pub struct RunHandle {
    ticket: Ticket,
    effect: EffectHandle,
}

impl RunHandle {
    /// Ticket this run was issued
    #[must_use]
    pub const fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Wait until the operation has settled and its event was dispatched (or dropped)
    pub async fn wait(&mut self) {
        self.effect.wait().await;
    }

    /// Wait for settlement with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the operation has not settled in time.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        self.effect.wait_with_timeout(timeout).await
    }
}

/// Public entry point of the lifecycle
///
/// Owns the lifecycle state, the lifeline of its owner, and the safe
/// dispatcher that ties them together. Construction attaches the lifeline.
pub struct AsyncOperationRunner<T>
where
    T: Clone + Send + Sync + 'static,
{
    store: LifecycleStore<T>,
    dispatcher: SafeDispatcher<LifecycleSink<T>>,
    snapshots: watch::Receiver<LifecycleSnapshot<T>>,
    closing: AtomicBool,
    config: RunnerConfig,
}

impl<T> AsyncOperationRunner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a runner with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner with custom configuration
    #[must_use]
    pub fn with_config(config: RunnerConfig) -> Self {
        let store = Store::with_broadcast_capacity(
            LifecycleState::Idle,
            LifecycleReducer::new(),
            (),
            config.broadcast_capacity,
        );
        let (tx, rx) = watch::channel(LifecycleSnapshot::idle());
        let sink = LifecycleSink {
            store: store.clone(),
            snapshots: Arc::new(tx),
        };
        let dispatcher =
            SafeDispatcher::wrap(sink, Lifeline::attached(), config.settlement_policy);

        Self {
            store,
            dispatcher,
            snapshots: rx,
            closing: AtomicBool::new(false),
            config,
        }
    }

    /// Start `operation` and drive it to settlement
    ///
    /// `Started` is applied before this returns. The operation runs in a
    /// spawned task; its `Succeeded` or `Failed` event goes through the safe
    /// dispatcher, so it is dropped if the owner detached, or if a newer run
    /// began under [`LatestStarted`](crate::SettlementPolicy::LatestStarted).
    ///
    /// A failure never escapes as an error: it becomes `Rejected` with a
    /// fresh [`OperationFailure`]; the technical error is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the runner is shutting down.
    #[tracing::instrument(skip(self, operation), name = "runner_run")]
    pub async fn run<F, X>(&self, operation: F) -> Result<RunHandle, StoreError>
    where
        F: Future<Output = Result<T, X>> + Send + 'static,
        X: FailureSource + Send + 'static,
    {
        if self.closing.load(Ordering::Acquire) {
            tracing::warn!("Rejected run: runner is shutting down");
            return Err(StoreError::ShutdownInProgress);
        }

        let ticket = self.dispatcher.lifeline().begin();
        metrics::counter!("lifecycle.runs.started").increment(1);
        tracing::debug!(generation = ticket.generation(), "Starting operation");

        self.dispatcher.dispatch(&ticket, LifecycleEvent::Started).await?;

        let dispatcher = self.dispatcher.clone();
        let effect = async_effect! {
            let event = match operation.await {
                Ok(value) => LifecycleEvent::Succeeded { value },
                Err(error) => {
                    tracing::warn!(
                        generation = ticket.generation(),
                        error = %error,
                        "Operation failed"
                    );
                    metrics::counter!("lifecycle.runs.failed").increment(1);
                    LifecycleEvent::Failed {
                        error: OperationFailure::from_source(&error),
                    }
                },
            };

            match dispatcher.dispatch(&ticket, event).await {
                Ok(Delivery::Delivered) => {},
                Ok(Delivery::Dropped) => tracing::debug!(
                    generation = ticket.generation(),
                    "Settlement arrived for a dead ticket"
                ),
                Err(error) => tracing::warn!(error = %error, "Settlement could not be applied"),
            }

            // The settlement was dispatched above; nothing to feed back
            None
        };

        Ok(RunHandle {
            ticket,
            effect: self.store.execute(effect),
        })
    }

    /// Dispatch an untyped event
    ///
    /// The event is checked against the current generation, like a
    /// settlement of the latest run.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Invariant`] for an unknown tag or missing
    /// payload; this is a caller bug and should not be swallowed.
    pub async fn dispatch_tagged(&self, event: TaggedEvent<T>) -> Result<Delivery, RunnerError> {
        let event = LifecycleEvent::try_from(event)?;
        let ticket = self.dispatcher.lifeline().current();
        Ok(self.dispatcher.dispatch(&ticket, event).await?)
    }

    /// Current read model
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot<T> {
        self.snapshots.borrow().clone()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> LifecycleStatus {
        self.snapshots.borrow().status
    }

    /// Receiver that is notified after every applied event
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot<T>> {
        self.snapshots.clone()
    }

    /// Receiver of every applied lifecycle event, in order
    #[must_use]
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent<T>> {
        self.store.subscribe_actions()
    }

    /// Mark the owner as attached
    pub fn attach(&self) {
        self.dispatcher.lifeline().attach();
    }

    /// Mark the owner as gone; no later settlement has any effect
    pub fn detach(&self) {
        tracing::debug!("Runner detached");
        self.dispatcher.lifeline().detach();
    }

    /// Check if the owner is attached
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.dispatcher.lifeline().is_attached()
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Stop accepting runs and wait for in-flight operations to settle
    ///
    /// Settlements that arrive while waiting are still applied (if their
    /// ticket is live); afterwards the store rejects everything.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if operations are still
    /// running after the configured default timeout.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.closing.store(true, Ordering::Release);
        self.store.drain(self.config.default_shutdown_timeout).await?;
        self.store.shutdown(Duration::ZERO).await
    }
}

impl<T> Default for AsyncOperationRunner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for AsyncOperationRunner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOperationRunner")
            .field("status", &self.status())
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_lifecycle_core::failure::{FailureKind, USER_FAILURE_MESSAGE};

    #[tokio::test]
    async fn test_new_runner_is_idle_and_attached() {
        let runner = AsyncOperationRunner::<u32>::new();

        assert_eq!(runner.status(), LifecycleStatus::Idle);
        assert!(runner.is_attached());
    }

    #[tokio::test]
    async fn test_started_visible_before_settlement() {
        let runner = AsyncOperationRunner::<u32>::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();

        let handle = runner
            .run(async move { rx.await.map_err(|e| e.to_string()) })
            .await;

        assert!(handle.is_ok());
        assert_eq!(runner.status(), LifecycleStatus::Pending);

        let _ = tx.send(5);
        if let Ok(mut handle) = handle {
            handle.wait().await;
        }
        assert_eq!(runner.snapshot().value, Some(5));
    }

    #[tokio::test]
    async fn test_failure_uses_fixed_message() {
        let runner = AsyncOperationRunner::<u32>::new();

        if let Ok(mut handle) = runner.run(async { Err::<u32, _>("404".to_string()) }).await {
            handle.wait().await;
        }

        let snapshot = runner.snapshot();
        assert_eq!(snapshot.status, LifecycleStatus::Rejected);
        let error = snapshot.error.unwrap_or_else(|| OperationFailure::new(FailureKind::Network));
        assert_eq!(error.user_message, USER_FAILURE_MESSAGE);
        assert_eq!(error.kind, FailureKind::Other);
    }

    #[tokio::test]
    async fn test_dispatch_tagged_unknown_tag_is_invariant_violation() {
        let runner = AsyncOperationRunner::<u32>::new();

        let result = runner.dispatch_tagged(TaggedEvent::new("resolved")).await;

        assert!(matches!(result, Err(RunnerError::Invariant(_))));
        assert_eq!(runner.status(), LifecycleStatus::Idle);
    }

    #[tokio::test]
    async fn test_dispatch_tagged_known_tag_applies() {
        let runner = AsyncOperationRunner::<u32>::new();

        let result = runner
            .dispatch_tagged(TaggedEvent::new("succeeded").with_value(3))
            .await;

        assert!(matches!(result, Ok(Delivery::Delivered)));
        assert_eq!(runner.snapshot().value, Some(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshot_matches_state_after_concurrent_settlements() {
        let config = RunnerConfig::default()
            .with_settlement_policy(crate::SettlementPolicy::LatestSettled)
            .with_broadcast_capacity(256);
        let runner = AsyncOperationRunner::<u32>::with_config(config);
        let mut events = runner.subscribe_events();

        let mut handles = Vec::new();
        for value in 0..64 {
            let run = runner
                .run(async move {
                    tokio::task::yield_now().await;
                    Ok::<u32, String>(value)
                })
                .await;
            if let Ok(handle) = run {
                handles.push(handle);
            }
        }
        assert_eq!(handles.len(), 64);
        for handle in &mut handles {
            assert!(handle.wait_with_timeout(Duration::from_secs(2)).await.is_ok());
        }

        let stored = runner.store.state(|s| LifecycleSnapshot::from(s)).await;
        assert_eq!(runner.snapshot(), stored);

        // The published snapshot belongs to the last applied event
        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        let published = runner.snapshot().value;
        assert!(matches!(
            last,
            Some(LifecycleEvent::Succeeded { value }) if published == Some(value)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_runs() {
        let runner = AsyncOperationRunner::<u32>::new();

        assert!(runner.shutdown().await.is_ok());
        let result = runner.run(async { Ok::<u32, String>(1) }).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }
}
