//! Failure types for lifecycle operations
//!
//! Two kinds of failure exist and they are handled very differently:
//!
//! - [`OperationFailure`]: the supplied future failed. This is a runtime
//!   condition; it is recovered into the `Rejected` state.
//! - [`InvariantViolation`]: an event could not be understood at all. This is
//!   a caller bug and is returned as an error all the way up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message shown to users for every failed operation
///
/// The technical cause is logged, never displayed.
pub const USER_FAILURE_MESSAGE: &str = "no record found for this identifier / malformed query";

/// Coarse classification of why an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The remote side has no record for the key
    NotFound,
    /// Transport-level failure (connection refused, timeout, ...)
    Network,
    /// A response arrived but could not be decoded
    Malformed,
    /// Anything else
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Network => write!(f, "network"),
            Self::Malformed => write!(f, "malformed"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A technical error that can be turned into an [`OperationFailure`]
///
/// Implemented by supplier error types so the runner can keep the failure
/// kind while discarding the technical detail.
pub trait FailureSource: std::fmt::Display {
    /// Classify this error
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Other
    }
}

impl FailureSource for String {}

impl FailureSource for &'static str {}

impl FailureSource for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        match self.kind() {
            std::io::ErrorKind::NotFound => FailureKind::NotFound,
            std::io::ErrorKind::InvalidData => FailureKind::Malformed,
            _ => FailureKind::Network,
        }
    }
}

/// User-facing failure stored in `Rejected`
///
/// Always built fresh from a [`FailureSource`]; the source error itself is
/// never stored or mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{user_message}")]
pub struct OperationFailure {
    /// Why the operation failed
    pub kind: FailureKind,
    /// Text safe to show to a user
    pub user_message: String,
}

impl OperationFailure {
    /// Build a failure of the given kind with the fixed user message
    #[must_use]
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            user_message: USER_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Build a failure from a technical error, keeping only its kind
    #[must_use]
    pub fn from_source<X>(source: &X) -> Self
    where
        X: FailureSource + ?Sized,
    {
        Self::new(source.failure_kind())
    }
}

/// A lifecycle event that the state machine cannot interpret
///
/// Indicates a programming error in whatever produced the event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// The event tag is not one of `started`, `succeeded`, `failed`
    #[error("unrecognized lifecycle event tag `{tag}`")]
    UnknownEventTag {
        /// The offending tag
        tag: String,
    },

    /// A known tag arrived without the payload it requires
    #[error("lifecycle event `{tag}` is missing its `{field}` payload")]
    MissingPayload {
        /// The event tag
        tag: String,
        /// The missing field
        field: &'static str,
    },
}
