//! Operation host: ties an identifier to a runner and renders the result
//!
//! The host owns the current identifier and an [`AsyncOperationRunner`].
//! Changing the identifier starts a lookup; rendering maps the runner's
//! lifecycle onto a [`View`], except that a rejection is raised as a
//! [`LookupFailure`] for an outer [`FailureBoundary`](crate::boundary::FailureBoundary)
//! to handle.

use crate::identifier::Identifier;
use crate::record::ItemRecord;
use async_lifecycle_core::environment::OperationSupplier;
use async_lifecycle_core::failure::{FailureKind, OperationFailure};
use async_lifecycle_core::lifecycle::{LifecycleSnapshot, LifecycleStatus};
use async_lifecycle_runtime::{AsyncOperationRunner, RunHandle, RunnerConfig, StoreError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

/// Where the host is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// No identifier; nothing to look up
    NoTarget,
    /// Identifier set but no lookup has started
    Idle,
    /// Lookup in flight
    Pending,
    /// Record available
    Resolved,
    /// Lookup failed
    Rejected,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget => write!(f, "no_target"),
            Self::Idle => write!(f, "idle"),
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// What the host renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Nothing to show
    Empty,
    /// Placeholder while loading; the identifier is the only known field
    Skeleton {
        /// Identifier being looked up
        number: Identifier,
    },
    /// The full record
    Record(ItemRecord),
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Skeleton { number } => write!(f, "#{number} loading..."),
            Self::Record(record) => write!(f, "{record}"),
        }
    }
}

/// A rejected lookup, raised out of [`OperationHost::render`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lookup of `{identifier}` failed: {failure}")]
pub struct LookupFailure {
    /// Identifier that was looked up
    pub identifier: Identifier,
    /// User-facing failure
    pub failure: OperationFailure,
}

impl LookupFailure {
    /// Text safe to show to a user
    #[must_use]
    pub fn user_message(&self) -> &str {
        &self.failure.user_message
    }
}

/// Host for one record lookup at a time
pub struct OperationHost<S>
where
    S: OperationSupplier<Output = ItemRecord>,
{
    supplier: S,
    runner: AsyncOperationRunner<ItemRecord>,
    runner_config: RunnerConfig,
    identifier: Option<Identifier>,
    mounted: bool,
}

impl<S> OperationHost<S>
where
    S: OperationSupplier<Output = ItemRecord>,
{
    /// Create a mounted host with default runner configuration
    #[must_use]
    pub fn new(supplier: S) -> Self {
        Self::with_config(supplier, RunnerConfig::default())
    }

    /// Create a mounted host with custom runner configuration
    #[must_use]
    pub fn with_config(supplier: S, runner_config: RunnerConfig) -> Self {
        Self {
            supplier,
            runner: AsyncOperationRunner::with_config(runner_config),
            runner_config,
            identifier: None,
            mounted: true,
        }
    }

    /// Change the identifier
    ///
    /// A new, non-empty identifier starts a lookup and returns its handle.
    /// Setting the current identifier again does nothing. `None` clears the
    /// target; a lookup still in flight may settle but is not rendered.
    /// While unmounted the identifier is only recorded; [`OperationHost::mount`]
    /// starts its lookup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the runner is shutting down.
    #[tracing::instrument(skip(self))]
    pub async fn set_identifier(
        &mut self,
        identifier: Option<Identifier>,
    ) -> Result<Option<RunHandle>, StoreError> {
        if identifier == self.identifier {
            tracing::trace!("Identifier unchanged");
            return Ok(None);
        }

        self.identifier = identifier;
        let Some(identifier) = &self.identifier else {
            tracing::debug!("Target cleared");
            return Ok(None);
        };

        if !self.mounted {
            tracing::debug!(identifier = %identifier, "Host unmounted, lookup deferred");
            return Ok(None);
        }

        self.start(identifier).await.map(Some)
    }

    async fn start(&self, identifier: &Identifier) -> Result<RunHandle, StoreError> {
        let operation = self.supplier.supply(identifier.as_str());
        self.runner.run(operation).await
    }

    /// Current identifier
    #[must_use]
    pub const fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> HostState {
        if self.identifier.is_none() {
            return HostState::NoTarget;
        }

        match self.runner.status() {
            LifecycleStatus::Idle => HostState::Idle,
            LifecycleStatus::Pending => HostState::Pending,
            LifecycleStatus::Resolved => HostState::Resolved,
            LifecycleStatus::Rejected => HostState::Rejected,
        }
    }

    /// Render the current state
    ///
    /// # Errors
    ///
    /// Returns [`LookupFailure`] when the lookup was rejected; the host does
    /// not render failures itself.
    pub fn render(&self) -> Result<View, LookupFailure> {
        let Some(identifier) = &self.identifier else {
            return Ok(View::Empty);
        };

        let LifecycleSnapshot {
            status,
            value,
            error,
        } = self.runner.snapshot();

        match status {
            LifecycleStatus::Idle => Ok(View::Empty),
            LifecycleStatus::Pending => Ok(View::Skeleton {
                number: identifier.clone(),
            }),
            LifecycleStatus::Resolved => Ok(value.map_or(View::Empty, View::Record)),
            LifecycleStatus::Rejected => Err(LookupFailure {
                identifier: identifier.clone(),
                failure: error.unwrap_or_else(|| OperationFailure::new(FailureKind::Other)),
            }),
        }
    }

    /// Clear the identifier and start over with a fresh runner
    ///
    /// The old runner is detached, so anything it still has in flight is
    /// dropped when it settles.
    pub fn reset(&mut self) {
        tracing::info!(identifier = ?self.identifier, "Resetting host");
        self.runner.detach();
        self.runner = AsyncOperationRunner::with_config(self.runner_config);
        if !self.mounted {
            self.runner.detach();
        }
        self.identifier = None;
    }

    /// Attach the host; settlements are applied again
    ///
    /// A lookup that never settled while the host was unmounted (deferred,
    /// or dropped on detach) is started again for the current identifier.
    /// Mounting a mounted host does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the runner is shutting down.
    pub async fn mount(&mut self) -> Result<Option<RunHandle>, StoreError> {
        if self.mounted {
            return Ok(None);
        }

        self.mounted = true;
        self.runner.attach();

        let unsettled = matches!(
            self.runner.status(),
            LifecycleStatus::Idle | LifecycleStatus::Pending
        );
        let Some(identifier) = self.identifier.as_ref().filter(|_| unsettled) else {
            return Ok(None);
        };

        tracing::debug!(identifier = %identifier, "Restarting lookup on mount");
        self.start(identifier).await.map(Some)
    }

    /// Detach the host; outstanding settlements are dropped
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.runner.detach();
    }

    /// Whether the host is mounted
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Watch lifecycle snapshots of the current runner
    ///
    /// A reset replaces the runner; subscribe again afterwards.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot<ItemRecord>> {
        self.runner.subscribe()
    }

    /// The current runner
    #[must_use]
    pub const fn runner(&self) -> &AsyncOperationRunner<ItemRecord> {
        &self.runner
    }

    /// Stop accepting lookups and wait for the one in flight
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if the lookup does not settle in time.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.runner.shutdown().await
    }
}

impl<S> fmt::Debug for OperationHost<S>
where
    S: OperationSupplier<Output = ItemRecord>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHost")
            .field("identifier", &self.identifier)
            .field("state", &self.state())
            .field("mounted", &self.mounted)
            .finish_non_exhaustive()
    }
}
