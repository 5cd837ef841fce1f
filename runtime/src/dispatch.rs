//! Safe dispatch guarded by generation tickets
//!
//! A [`Lifeline`] is shared between the owner of some state (a view, a
//! host) and every asynchronous callback that may later want to update
//! that state. Each run takes a [`Ticket`]; when the callback settles it
//! hands the ticket back to the [`SafeDispatcher`], which only forwards the
//! event if the ticket is still live.
//!
//! A ticket dies when:
//! - the lifeline is detached (the owner went away), or
//! - under [`SettlementPolicy::LatestStarted`], a newer run began or the
//!   lifeline was invalidated.
//!
//! Dropping an event for a dead ticket is the expected outcome for late
//! callbacks, not an error.

use crate::error::StoreError;
use crate::store::Store;
use async_lifecycle_core::reducer::Reducer;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Which settlement wins when runs overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// Only the most recently started run may settle; earlier runs are ignored
    #[default]
    LatestStarted,
    /// Any run may settle while the owner is attached; the last one to settle wins
    LatestSettled,
}

impl std::str::FromStr for SettlementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest_started" | "latest-started" => Ok(Self::LatestStarted),
            "latest_settled" | "latest-settled" => Ok(Self::LatestSettled),
            other => Err(format!("unknown settlement policy: {other}")),
        }
    }
}

#[derive(Debug, Default)]
struct LifelineInner {
    attached: AtomicBool,
    /// Bumped on every attach; a ticket from an earlier attachment is never live
    epoch: AtomicU64,
    /// Bumped on every run start, invalidation and detach
    generation: AtomicU64,
}

/// Shared liveness token for one owner
///
/// Cloning yields another handle to the same token.
#[derive(Debug, Clone, Default)]
pub struct Lifeline {
    inner: Arc<LifelineInner>,
}

impl Lifeline {
    /// Create a detached lifeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lifeline that is already attached
    #[must_use]
    pub fn attached() -> Self {
        let lifeline = Self::new();
        lifeline.attach();
        lifeline
    }

    /// Mark the owner as attached
    pub fn attach(&self) {
        if !self.inner.attached.swap(true, Ordering::SeqCst) {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Mark the owner as gone
    ///
    /// Every outstanding ticket is dead once this returns.
    pub fn detach(&self) {
        self.inner.attached.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Check if the owner is attached
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst)
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Start a new run and return its ticket
    ///
    /// Under [`SettlementPolicy::LatestStarted`] this kills every earlier ticket.
    #[must_use]
    pub fn begin(&self) -> Ticket {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            generation,
        }
    }

    /// Ticket for the current generation without starting a run
    #[must_use]
    pub fn current(&self) -> Ticket {
        Ticket {
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            generation: self.generation(),
        }
    }

    /// Kill every outstanding ticket without detaching
    pub fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Check if `ticket` may still deliver events
    #[must_use]
    pub fn is_live(&self, ticket: &Ticket, policy: SettlementPolicy) -> bool {
        if !self.is_attached() || ticket.epoch != self.inner.epoch.load(Ordering::SeqCst) {
            return false;
        }

        match policy {
            SettlementPolicy::LatestStarted => ticket.generation == self.generation(),
            SettlementPolicy::LatestSettled => true,
        }
    }
}

/// Captured generation of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    epoch: u64,
    generation: u64,
}

impl Ticket {
    /// Generation this ticket was issued for
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of a safe dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The event reached the raw dispatch
    Delivered,
    /// The ticket was dead; the event had no effect
    Dropped,
}

impl Delivery {
    /// Check if the event was delivered
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Raw, unguarded dispatch of actions into some state
///
/// `guard` must be evaluated at the point where no other action can be
/// applied concurrently; the action is applied only if it returns `true`.
pub trait Dispatch<A>: Send + Sync {
    /// Apply `action` if `guard` holds
    ///
    /// Returns `Ok(true)` if the action was applied.
    fn dispatch_guarded<'a>(
        &'a self,
        action: A,
        guard: &'a (dyn Fn() -> bool + Sync),
    ) -> BoxFuture<'a, Result<bool, StoreError>>;
}

impl<S, A, E, R> Dispatch<A> for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn dispatch_guarded<'a>(
        &'a self,
        action: A,
        guard: &'a (dyn Fn() -> bool + Sync),
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let handle = self.send_if(action, guard).await?;
            Ok(handle.is_some())
        })
    }
}

/// Dispatch wrapper that drops events for dead tickets
pub struct SafeDispatcher<D> {
    raw: Arc<D>,
    lifeline: Lifeline,
    policy: SettlementPolicy,
}

impl<D> SafeDispatcher<D> {
    /// Wrap a raw dispatch
    #[must_use]
    pub fn wrap(raw: D, lifeline: Lifeline, policy: SettlementPolicy) -> Self {
        Self {
            raw: Arc::new(raw),
            lifeline,
            policy,
        }
    }

    /// The lifeline tickets are checked against
    #[must_use]
    pub const fn lifeline(&self) -> &Lifeline {
        &self.lifeline
    }

    /// The policy tickets are checked with
    #[must_use]
    pub const fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    /// Forward `action` if `ticket` is live at the time it would be applied
    ///
    /// # Errors
    ///
    /// Propagates errors from the raw dispatch. A dead ticket is not an error.
    pub async fn dispatch<A>(&self, ticket: &Ticket, action: A) -> Result<Delivery, StoreError>
    where
        D: Dispatch<A>,
    {
        let lifeline = &self.lifeline;
        let policy = self.policy;
        let guard = move || lifeline.is_live(ticket, policy);

        if self.raw.dispatch_guarded(action, &guard).await? {
            metrics::counter!("lifecycle.events.applied").increment(1);
            Ok(Delivery::Delivered)
        } else {
            tracing::trace!(
                generation = ticket.generation(),
                current = lifeline.generation(),
                attached = lifeline.is_attached(),
                "Dropped event for dead ticket"
            );
            metrics::counter!("lifecycle.events.dropped").increment(1);
            Ok(Delivery::Dropped)
        }
    }
}

impl<D> Clone for SafeDispatcher<D> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            lifeline: self.lifeline.clone(),
            policy: self.policy,
        }
    }
}

impl<D> std::fmt::Debug for SafeDispatcher<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeDispatcher")
            .field("lifeline", &self.lifeline)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
