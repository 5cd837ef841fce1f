//! The four-state lifecycle of a single asynchronous operation
//!
//! ```text
//!            Started               Succeeded
//!   Idle ───────────▶ Pending ─────────────────▶ Resolved
//!                       │  ▲                        │
//!                       │  └──────── Started ───────┤
//!                       │ Failed                    │
//!                       ▼                   Failed  │
//!                   Rejected ◀──────────────────────┘
//! ```
//!
//! `Started` yields `Pending` from every state. Entering `Pending` or
//! `Rejected` drops whatever value the previous state held.

use crate::effect::Effect;
use crate::failure::{InvariantViolation, OperationFailure};
use crate::reducer::Reducer;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::marker::PhantomData;

/// Wire tag for [`LifecycleEvent::Started`]
pub const TAG_STARTED: &str = "started";
/// Wire tag for [`LifecycleEvent::Succeeded`]
pub const TAG_SUCCEEDED: &str = "succeeded";
/// Wire tag for [`LifecycleEvent::Failed`]
pub const TAG_FAILED: &str = "failed";

/// Progress of one asynchronous operation
///
/// Exactly one variant is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LifecycleState<T, E = OperationFailure> {
    /// No operation requested yet
    Idle,
    /// Operation started, no result yet
    Pending,
    /// Operation completed successfully
    Resolved {
        /// The operation's result
        value: T,
    },
    /// Operation completed with a failure
    Rejected {
        /// User-facing failure
        error: E,
    },
}

impl<T, E> Default for LifecycleState<T, E> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T, E> LifecycleState<T, E> {
    /// Payload-free tag of this state
    #[must_use]
    pub const fn status(&self) -> LifecycleStatus {
        match self {
            Self::Idle => LifecycleStatus::Idle,
            Self::Pending => LifecycleStatus::Pending,
            Self::Resolved { .. } => LifecycleStatus::Resolved,
            Self::Rejected { .. } => LifecycleStatus::Rejected,
        }
    }

    /// Check if no operation has been requested
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if an operation is in flight
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check if the operation succeeded
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Check if the operation failed
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// The resolved value, if any
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Resolved { value } => Some(value),
            _ => None,
        }
    }

    /// The rejection error, if any
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Rejected { error } => Some(error),
            _ => None,
        }
    }
}

/// Payload-free view of [`LifecycleState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// No operation requested yet
    Idle,
    /// Operation in flight
    Pending,
    /// Operation succeeded
    Resolved,
    /// Operation failed
    Rejected,
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Read model handed to renderers
///
/// Re-derived from the state after every applied event; `value` and `error`
/// are never both set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleSnapshot<T, E = OperationFailure> {
    /// Current status
    pub status: LifecycleStatus,
    /// Resolved value, only when `status` is `Resolved`
    pub value: Option<T>,
    /// Rejection error, only when `status` is `Rejected`
    pub error: Option<E>,
}

impl<T, E> LifecycleSnapshot<T, E> {
    /// Snapshot of the `Idle` state
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            status: LifecycleStatus::Idle,
            value: None,
            error: None,
        }
    }
}

impl<T, E> Default for LifecycleSnapshot<T, E> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T: Clone, E: Clone> From<&LifecycleState<T, E>> for LifecycleSnapshot<T, E> {
    fn from(state: &LifecycleState<T, E>) -> Self {
        Self {
            status: state.status(),
            value: state.value().cloned(),
            error: state.error().cloned(),
        }
    }
}

/// Input to the lifecycle state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent<T, E = OperationFailure> {
    /// An operation was started
    Started,
    /// The operation produced a value
    Succeeded {
        /// The produced value
        value: T,
    },
    /// The operation failed
    Failed {
        /// User-facing failure
        error: E,
    },
}

impl<T, E> LifecycleEvent<T, E> {
    /// Wire tag of this event
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Started => TAG_STARTED,
            Self::Succeeded { .. } => TAG_SUCCEEDED,
            Self::Failed { .. } => TAG_FAILED,
        }
    }
}

/// Untyped lifecycle event as delivered by dynamically shaped sources
///
/// Must be decoded into a [`LifecycleEvent`] before it can touch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedEvent<T, E = OperationFailure> {
    /// Event tag (`started`, `succeeded`, `failed`)
    pub tag: String,
    /// Payload for `succeeded`
    #[serde(default)]
    pub value: Option<T>,
    /// Payload for `failed`
    #[serde(default)]
    pub error: Option<E>,
}

impl<T, E> TaggedEvent<T, E> {
    /// Event with a tag and no payload
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: None,
            error: None,
        }
    }

    /// Attach a success payload
    #[must_use]
    pub fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    /// Attach a failure payload
    #[must_use]
    pub fn with_error(mut self, error: E) -> Self {
        self.error = Some(error);
        self
    }
}

impl<T, E> TryFrom<TaggedEvent<T, E>> for LifecycleEvent<T, E> {
    type Error = InvariantViolation;

    fn try_from(event: TaggedEvent<T, E>) -> Result<Self, Self::Error> {
        let TaggedEvent { tag, value, error } = event;
        match tag.as_str() {
            TAG_STARTED => Ok(Self::Started),
            TAG_SUCCEEDED => value
                .map(|value| Self::Succeeded { value })
                .ok_or(InvariantViolation::MissingPayload { tag, field: "value" }),
            TAG_FAILED => error
                .map(|error| Self::Failed { error })
                .ok_or(InvariantViolation::MissingPayload { tag, field: "error" }),
            _ => Err(InvariantViolation::UnknownEventTag { tag }),
        }
    }
}

/// Apply one event to a state
///
/// Pure and total over typed events.
#[must_use]
pub fn transition<T, E>(
    _state: LifecycleState<T, E>,
    event: LifecycleEvent<T, E>,
) -> LifecycleState<T, E> {
    match event {
        LifecycleEvent::Started => LifecycleState::Pending,
        LifecycleEvent::Succeeded { value } => LifecycleState::Resolved { value },
        LifecycleEvent::Failed { error } => LifecycleState::Rejected { error },
    }
}

/// Apply one untyped event to a state
///
/// # Errors
///
/// Returns [`InvariantViolation`] if the tag is unknown or its payload is
/// missing, whatever the prior state.
pub fn transition_tagged<T, E>(
    state: LifecycleState<T, E>,
    event: TaggedEvent<T, E>,
) -> Result<LifecycleState<T, E>, InvariantViolation> {
    let event = LifecycleEvent::try_from(event)?;
    Ok(transition(state, event))
}

/// Reducer over [`LifecycleState`]
///
/// Holds no state of its own; it exists so the lifecycle can run inside a
/// `Store`.
pub struct LifecycleReducer<T, E = OperationFailure> {
    _phantom: PhantomData<fn() -> (T, E)>,
}

impl<T, E> LifecycleReducer<T, E> {
    /// Create a new lifecycle reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T, E> Default for LifecycleReducer<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for LifecycleReducer<T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for LifecycleReducer<T, E> {}

impl<T, E> std::fmt::Debug for LifecycleReducer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LifecycleReducer")
    }
}

impl<T, E> Reducer for LifecycleReducer<T, E> {
    type State = LifecycleState<T, E>;
    type Action = LifecycleEvent<T, E>;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        *state = transition(std::mem::take(state), action);

        // Pure state machine - no side effects
        smallvec![Effect::None]
    }
}
