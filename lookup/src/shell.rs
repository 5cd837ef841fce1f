//! One step of the terminal shell
//!
//! Turns a line of raw input into a finished lookup on a [`FailureBoundary`].
//! A failure shown by the boundary is reset right away so the next line
//! starts clean.

use crate::boundary::{BoundaryView, FailureBoundary};
use crate::identifier::{normalize, IdentifierError};
use crate::record::ItemRecord;
use async_lifecycle_core::environment::OperationSupplier;
use async_lifecycle_runtime::StoreError;
use std::fmt;

/// Outcome of one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Input was not an identifier; nothing ran
    Invalid(IdentifierError),
    /// Input was handled by the boundary
    Rendered {
        /// Shown while the lookup was in flight, if one started
        loading: Option<BoundaryView>,
        /// Shown once the lookup settled
        view: BoundaryView,
        /// The boundary caught a failure and was reset
        reset: bool,
    },
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(error) => write!(f, "{error}"),
            Self::Rendered {
                loading,
                view,
                reset,
            } => {
                if let Some(loading) = loading {
                    writeln!(f, "{loading}")?;
                }
                match view {
                    BoundaryView::Fallback { message } if *reset => {
                        write!(f, "{message} (resetting)")
                    },
                    view => write!(f, "{view}"),
                }
            },
        }
    }
}

/// Normalize `raw`, look it up, and wait for the result
///
/// Input that does not normalize never reaches the host.
///
/// # Errors
///
/// Returns [`StoreError::ShutdownInProgress`] if the host is shutting down.
#[tracing::instrument(skip(boundary))]
pub async fn submit<S>(
    boundary: &mut FailureBoundary<S>,
    raw: &str,
) -> Result<Submission, StoreError>
where
    S: OperationSupplier<Output = ItemRecord>,
{
    let identifier = match normalize(raw) {
        Ok(identifier) => identifier,
        Err(error) => {
            tracing::info!(error = %error, "Ignoring input");
            return Ok(Submission::Invalid(error));
        },
    };

    let loading = match boundary.host_mut().set_identifier(identifier).await? {
        Some(mut handle) => {
            let loading = boundary.render();
            handle.wait().await;
            Some(loading)
        },
        None => None,
    };

    let view = boundary.render();
    let reset = matches!(view, BoundaryView::Fallback { .. });
    if reset {
        boundary.try_again();
    }

    Ok(Submission::Rendered {
        loading,
        view,
        reset,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use crate::host::{HostState, OperationHost, View};
    use async_lifecycle_core::failure::USER_FAILURE_MESSAGE;
    use async_lifecycle_testing::MockSupplier;

    #[tokio::test]
    async fn test_resolved_lookup_shows_skeleton_then_record() {
        let record = ItemRecord::new("007", "Male");
        let supplier = MockSupplier::new().with_value("007", record.clone());
        let mut boundary = FailureBoundary::new(OperationHost::new(supplier));

        let submission = submit(&mut boundary, "7").await.unwrap();

        assert_eq!(
            submission,
            Submission::Rendered {
                loading: Some(BoundaryView::Content(View::Skeleton {
                    number: "007".parse().unwrap()
                })),
                view: BoundaryView::Content(View::Record(record)),
                reset: false,
            }
        );
    }

    #[tokio::test]
    async fn test_failure_is_shown_once_then_reset() {
        let supplier = MockSupplier::<ItemRecord>::new().with_failure("404", "404");
        let mut boundary = FailureBoundary::new(OperationHost::new(supplier));

        let submission = submit(&mut boundary, "404").await.unwrap();

        assert!(matches!(
            &submission,
            Submission::Rendered { reset: true, .. }
        ));
        assert_eq!(
            submission.to_string().lines().last(),
            Some(format!("{USER_FAILURE_MESSAGE} (resetting)").as_str())
        );
        assert_eq!(boundary.host().state(), HostState::NoTarget);
        assert!(boundary.caught().is_none());
    }

    #[tokio::test]
    async fn test_repeated_identifier_does_not_run_again() {
        let supplier = MockSupplier::new().with_value("150", ItemRecord::new("150", "Alien"));
        let mut boundary = FailureBoundary::new(OperationHost::new(supplier.clone()));

        submit(&mut boundary, "150").await.unwrap();
        let again = submit(&mut boundary, "0150").await.unwrap();

        assert!(matches!(again, Submission::Rendered { loading: None, .. }));
        assert_eq!(supplier.calls(), vec!["150".to_string()]);
    }
}
