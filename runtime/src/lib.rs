//! # Async Lifecycle Runtime
//!
//! Runtime implementation for the async lifecycle.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling, plus the pieces that drive one asynchronous
//! operation through the lifecycle reducer.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **`SafeDispatcher`**: Forwards events only while their ticket is live
//! - **`AsyncOperationRunner`**: Drives a future through `Started` and its settlement
//!
//! ## Example
//!
//! ```ignore
//! use async_lifecycle_runtime::AsyncOperationRunner;
//!
//! let runner = AsyncOperationRunner::<u32>::new();
//!
//! let mut handle = runner.run(async { Ok::<_, String>(7) }).await?;
//! handle.wait().await;
//!
//! assert_eq!(runner.snapshot().value, Some(7));
//! ```

use async_lifecycle_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Safe dispatch guarded by generation tickets
pub mod dispatch;

/// The asynchronous operation runner
pub mod runner;

pub use dispatch::{Delivery, Dispatch, Lifeline, SafeDispatcher, SettlementPolicy, Ticket};
pub use runner::{AsyncOperationRunner, RunHandle};

/// Error types for the Store runtime
pub mod error {
    use async_lifecycle_core::failure::InvariantViolation;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// A task join error occurred during effect execution
        ///
        /// This typically means a spawned task panicked.
        #[error("Task failed during effect execution: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),

        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }

    /// Errors surfaced by the operation runner
    #[derive(Error, Debug)]
    pub enum RunnerError {
        /// The underlying store rejected the event
        #[error(transparent)]
        Store(#[from] StoreError),

        /// An event could not be interpreted; this is a caller bug
        #[error("Lifecycle invariant violated: {0}")]
        Invariant(#[from] InvariantViolation),
    }
}

pub use error::{RunnerError, StoreError};

/// Configuration for runner instances
///
/// # Example
///
/// ```ignore
/// let config = RunnerConfig::default()
///     .with_settlement_policy(SettlementPolicy::LatestSettled)
///     .with_shutdown_timeout(Duration::from_secs(1));
///
/// let runner = AsyncOperationRunner::<Record>::with_config(config);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Which overlapping settlement is allowed to win
    pub settlement_policy: SettlementPolicy,
    /// Capacity of the store's action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl RunnerConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(
        settlement_policy: SettlementPolicy,
        broadcast_capacity: usize,
        default_shutdown_timeout: Duration,
    ) -> Self {
        Self {
            settlement_policy,
            broadcast_capacity,
            default_shutdown_timeout,
        }
    }

    /// Set the settlement policy
    #[must_use]
    pub const fn with_settlement_policy(mut self, policy: SettlementPolicy) -> Self {
        self.settlement_policy = policy;
        self
    }

    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            settlement_policy: SettlementPolicy::LatestStarted,
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] and [`Store::execute()`] to allow waiting
/// for effects to complete. Dropping the handle does not cancel anything.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle
    ///
    /// # Returns
    ///
    /// A tuple of `(EffectHandle, EffectTracking)` where:
    /// - `EffectHandle` is returned to the caller for waiting
    /// - `EffectTracking` is used internally for effect execution
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    ///
    /// Returns when the effect counter reaches zero.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, so nothing can still be running
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (state transitions)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Every action applied by the reducer is broadcast to observers,
        /// in the order it was applied.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Action broadcast capacity defaults to 16.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new Store with custom action broadcast capacity
        ///
        /// Increase the capacity if observers frequently lag.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions, including feedback)
        /// 2. Waits for pending effects to complete (with timeout)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);
            self.drain(timeout).await
        }

        /// Wait for pending effects to complete without rejecting actions
        ///
        /// Effects that are still running may keep sending actions.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn drain(&self, timeout: Duration) -> Result<(), StoreError> {
            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Drain timeout: {} effects still running", pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(
                    pending_effects = pending,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Waiting for effects to complete"
                );

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Broadcasts the action to observers
        /// 4. Releases the lock and executes returned effects asynchronously
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            let handle = self.send_internal(action, || true, |_| {}).await?;
            Ok(handle.unwrap_or_else(EffectHandle::completed))
        }

        /// Send an action only if `guard` holds once the write lock is held
        ///
        /// The guard is evaluated while no other action can be reduced, so a
        /// concurrent writer cannot slip in between the check and the reducer.
        ///
        /// # Returns
        ///
        /// `Ok(None)` when the guard rejected the action.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        pub async fn send_if<G>(
            &self,
            action: A,
            guard: G,
        ) -> Result<Option<EffectHandle>, StoreError>
        where
            R: Clone,
            E: Clone,
            G: FnOnce() -> bool,
        {
            self.send_internal(action, guard, |_| {}).await
        }

        /// Like [`Store::send_if`], then run `observe` on the reduced state
        ///
        /// `observe` runs under the same write lock as the reducer, so what it
        /// sees is exactly the state this action produced. Keep it short and
        /// non-blocking.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        pub async fn send_if_observed<G, O>(
            &self,
            action: A,
            guard: G,
            observe: O,
        ) -> Result<Option<EffectHandle>, StoreError>
        where
            R: Clone,
            E: Clone,
            G: FnOnce() -> bool,
            O: FnOnce(&S),
        {
            self.send_internal(action, guard, observe).await
        }

        /// Subscribe to all actions applied by this store
        ///
        /// If the receiver lags, it will skip old actions and receive
        /// `RecvError::Lagged`.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Execute an effect that was not produced by the reducer
        ///
        /// Used by callers that build effects themselves (the operation
        /// runner builds one per `run`).
        #[must_use]
        pub fn execute(&self, effect: Effect<A>) -> EffectHandle
        where
            R: Clone,
            E: Clone,
        {
            let (handle, tracking) = EffectHandle::new();
            self.execute_effect_internal(effect, &tracking);
            handle
        }

        /// Internal send implementation
        async fn send_internal<G, O>(
            &self,
            action: A,
            guard: G,
            observe: O,
        ) -> Result<Option<EffectHandle>, StoreError>
        where
            R: Clone,
            E: Clone,
            G: FnOnce() -> bool,
            O: FnOnce(&S),
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                if !guard() {
                    tracing::trace!("Guard rejected action");
                    return Ok(None);
                }

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                metrics::counter!("store.commands.total").increment(1);
                let effects = self.reducer.reduce(&mut *state, action.clone(), &self.environment);

                // Broadcast while still holding the lock so observers see actions in order
                let _ = self.action_broadcast.send(action);
                observe(&*state);

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect_internal(effect, &tracking);
            }

            Ok(Some(handle))
        }

        /// Read current state via a closure
        ///
        /// Access state through a closure to ensure the lock is released promptly:
        ///
        /// ```ignore
        /// let status = store.state(|s| s.status()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Execute an effect with tracking
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation in a spawned task, sends the
        ///   resulting action if `Some`
        ///
        /// [`DecrementGuard`] keeps the counter correct even if the effect panics.
        fn execute_effect_internal(&self, effect: Effect<A>, tracking: &EffectTracking)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    // Track global pending effects for shutdown
                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let guard = DecrementGuard(tracking.clone());
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard; // Decrement on drop

                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            if let Err(error) = store.send(action).await {
                                tracing::warn!(error = %error, "Feedback action rejected");
                            }
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use async_lifecycle_core::{smallvec, SmallVec};

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        ProduceEffect,
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::ProduceEffect => {
                    smallvec![Effect::Future(Box::pin(async {
                        Some(TestAction::Increment)
                    }))]
                },
            }
        }
    }

    fn test_store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState { value: 0 }, TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn test_send_action() {
        let store = test_store();

        let _ = store.send(TestAction::Increment).await;
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_effect_feedback() {
        let store = test_store();

        let result = store.send(TestAction::ProduceEffect).await;
        assert!(result.is_ok());
        if let Ok(mut handle) = result {
            assert!(handle.wait_with_timeout(Duration::from_secs(1)).await.is_ok());
        }

        // The feedback send happens inside the effect task, before it completes
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_send_if_rejected_by_guard() {
        let store = test_store();

        let result = store.send_if(TestAction::Increment, || false).await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(store.state(|s| s.value).await, 0);
    }

    #[tokio::test]
    async fn test_observer_sees_reduced_state() {
        let store = test_store();
        let mut seen = None;

        let result = store
            .send_if_observed(TestAction::Increment, || true, |s| seen = Some(s.value))
            .await;
        assert!(matches!(result, Ok(Some(_))));
        assert_eq!(seen, Some(1));

        let result = store
            .send_if_observed(TestAction::Increment, || false, |s| seen = Some(s.value))
            .await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(seen, Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_observers_run_in_reduction_order() {
        let store = test_store();
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                let observed = Arc::clone(&observed);
                tokio::spawn(async move {
                    let _ = store
                        .send_if_observed(TestAction::Increment, || true, |s| {
                            if let Ok(mut values) = observed.lock() {
                                values.push(s.value);
                            }
                        })
                        .await;
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.is_ok());
        }

        let values = observed.lock().map(|v| v.clone()).unwrap_or_default();
        assert_eq!(values, (1..=32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_actions_broadcast_in_order() {
        let store = test_store();
        let mut rx = store.subscribe_actions();

        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::ProduceEffect).await;

        assert_eq!(rx.recv().await.ok(), Some(TestAction::Increment));
        assert_eq!(rx.recv().await.ok(), Some(TestAction::ProduceEffect));
        assert_eq!(rx.recv().await.ok(), Some(TestAction::Increment));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_actions() {
        let store = test_store();

        assert!(store.shutdown(Duration::from_millis(100)).await.is_ok());
        let result = store.send(TestAction::Increment).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_effect() {
        let store = test_store();

        let _handle = store.execute(Effect::Future(Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            None
        })));

        let result = store.shutdown(Duration::from_millis(30)).await;
        assert!(matches!(result, Err(StoreError::ShutdownTimeout(1))));
    }

    #[tokio::test]
    async fn test_completed_handle() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        assert!(handle.wait_with_timeout(Duration::from_millis(10)).await.is_ok());
    }

    #[test]
    fn test_runner_config_builder() {
        let config = RunnerConfig::default()
            .with_settlement_policy(SettlementPolicy::LatestSettled)
            .with_broadcast_capacity(64)
            .with_shutdown_timeout(Duration::from_secs(1));

        assert_eq!(config.settlement_policy, SettlementPolicy::LatestSettled);
        assert_eq!(config.broadcast_capacity, 64);
        assert_eq!(config.default_shutdown_timeout, Duration::from_secs(1));
    }
}
