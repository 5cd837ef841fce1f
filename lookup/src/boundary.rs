//! Failure boundary around an [`OperationHost`]
//!
//! The host raises a [`LookupFailure`] instead of rendering it. The boundary
//! catches it, shows a fallback with the user-facing message, and keeps
//! showing it until [`FailureBoundary::try_again`] resets the host.

use crate::host::{LookupFailure, OperationHost, View};
use crate::record::ItemRecord;
use async_lifecycle_core::environment::OperationSupplier;
use std::fmt;

/// What the boundary renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryView {
    /// The host rendered normally
    Content(View),
    /// The host raised a failure
    Fallback {
        /// Text safe to show to a user
        message: String,
    },
}

impl fmt::Display for BoundaryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(view) => write!(f, "{view}"),
            Self::Fallback { message } => write!(f, "{message} (try again)"),
        }
    }
}

/// Catches failures raised by a host and offers a reset
#[derive(Debug)]
pub struct FailureBoundary<S>
where
    S: OperationSupplier<Output = ItemRecord>,
{
    host: OperationHost<S>,
    caught: Option<LookupFailure>,
}

impl<S> FailureBoundary<S>
where
    S: OperationSupplier<Output = ItemRecord>,
{
    /// Wrap a host
    #[must_use]
    pub const fn new(host: OperationHost<S>) -> Self {
        Self { host, caught: None }
    }

    /// Render the host, catching a raised failure
    pub fn render(&mut self) -> BoundaryView {
        if let Some(failure) = &self.caught {
            return BoundaryView::Fallback {
                message: failure.user_message().to_string(),
            };
        }

        match self.host.render() {
            Ok(view) => BoundaryView::Content(view),
            Err(failure) => {
                tracing::warn!(
                    identifier = %failure.identifier,
                    kind = %failure.failure.kind,
                    "Lookup failure reached the boundary"
                );
                let message = failure.user_message().to_string();
                self.caught = Some(failure);
                BoundaryView::Fallback { message }
            },
        }
    }

    /// The failure currently shown, if any
    #[must_use]
    pub const fn caught(&self) -> Option<&LookupFailure> {
        self.caught.as_ref()
    }

    /// Dismiss the failure and reset the host to no target
    pub fn try_again(&mut self) {
        self.caught = None;
        self.host.reset();
    }

    /// The wrapped host
    #[must_use]
    pub const fn host(&self) -> &OperationHost<S> {
        &self.host
    }

    /// The wrapped host, mutably
    pub const fn host_mut(&mut self) -> &mut OperationHost<S> {
        &mut self.host
    }
}
