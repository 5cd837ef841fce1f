//! # Async Lifecycle Core
//!
//! Core traits and types for driving a single asynchronous operation
//! through a four-state lifecycle.
//!
//! ## Core Concepts
//!
//! - **State**: [`LifecycleState`], exactly one of `Idle`, `Pending`, `Resolved`, `Rejected`
//! - **Action**: [`LifecycleEvent`], the inputs that move the state machine
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits (e.g. an [`OperationSupplier`])
//!
//! ## Example
//!
//! ```
//! use async_lifecycle_core::lifecycle::{transition, LifecycleEvent, LifecycleState};
//!
//! let state: LifecycleState<u32, String> = LifecycleState::Idle;
//! let state = transition(state, LifecycleEvent::Started);
//! assert!(state.is_pending());
//!
//! let state = transition(state, LifecycleEvent::Succeeded { value: 7 });
//! assert_eq!(state.value(), Some(&7));
//! ```
//!
//! [`LifecycleState`]: lifecycle::LifecycleState
//! [`LifecycleEvent`]: lifecycle::LifecycleEvent
//! [`OperationSupplier`]: environment::OperationSupplier

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

pub use effect::Effect;
pub use reducer::Reducer;

/// Failure types shared by every lifecycle consumer
pub mod failure;

/// The four-state lifecycle reducer
pub mod lifecycle;

/// Declarative macros for constructing effects
mod effect_macros;

/// Reducer module - The core trait for state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They are deterministic and testable without a runtime.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for LifecycleReducer<T, E> {
    ///     type State = LifecycleState<T, E>;
    ///     type Action = LifecycleEvent<T, E>;
    ///     type Environment = ();
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut Self::State,
    ///         action: Self::Action,
    ///         _env: &Self::Environment,
    ///     ) -> SmallVec<[Effect<Self::Action>; 4]> {
    ///         *state = transition(std::mem::take(state), action);
    ///         smallvec![Effect::None]
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Updates state in place
        /// 2. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution).
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers (or built by the runner) and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Check if this effect is a no-op
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use crate::failure::FailureSource;
    use futures::future::BoxFuture;

    /// Operation supplier - produces the future for one lookup
    ///
    /// The core treats the returned future as opaque: it does not care
    /// whether it talks HTTP, reads a file, or is a test double.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - fetches over HTTP
    /// struct HttpRecordSupplier { client: reqwest::Client, base_url: String }
    ///
    /// // Test - canned responses
    /// let supplier = MockSupplier::new().with_value("007", record);
    /// ```
    pub trait OperationSupplier: Send + Sync {
        /// Value produced on success
        type Output: Send + 'static;

        /// Technical error produced on failure
        type Error: FailureSource + Send + 'static;

        /// Start the operation for `key`
        fn supply(&self, key: &str) -> BoxFuture<'static, Result<Self::Output, Self::Error>>;
    }
}
