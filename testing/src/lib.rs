//! # Async Lifecycle Testing
//!
//! Testing utilities and helpers for the async lifecycle.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - Manually settled futures for ordering tests
//! - A Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use async_lifecycle_testing::mocks::deferred;
//!
//! #[tokio::test]
//! async fn test_late_settlement() {
//!     let runner = AsyncOperationRunner::<u32>::new();
//!     let (handle, operation) = deferred::<u32, String>();
//!
//!     let mut run = runner.run(operation).await?;
//!     runner.detach();
//!     handle.resolve(7);
//!     run.wait().await;
//!
//!     assert_eq!(runner.status(), LifecycleStatus::Pending);
//! }
//! ```

/// Fluent reducer testing harness
pub mod reducer_test;

pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations for testing.
pub mod mocks {
    use async_lifecycle_core::environment::OperationSupplier;
    use async_lifecycle_core::failure::{FailureKind, FailureSource};
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use thiserror::Error;
    use tokio::sync::oneshot;

    /// Settles a future created by [`deferred`]
    #[derive(Debug)]
    pub struct DeferredHandle<T, X> {
        tx: oneshot::Sender<Result<T, X>>,
    }

    impl<T, X> DeferredHandle<T, X> {
        /// Settle with success
        ///
        /// Returns `false` if the future was already dropped.
        pub fn resolve(self, value: T) -> bool {
            self.tx.send(Ok(value)).is_ok()
        }

        /// Settle with failure
        ///
        /// Returns `false` if the future was already dropped.
        pub fn reject(self, error: X) -> bool {
            self.tx.send(Err(error)).is_ok()
        }
    }

    /// Create a future that settles only when the test says so
    ///
    /// If the handle is dropped without settling, the future never completes.
    ///
    /// # Example
    ///
    /// ```
    /// use async_lifecycle_testing::mocks::deferred;
    ///
    /// # tokio_test::block_on(async {
    /// let (handle, operation) = deferred::<u32, String>();
    /// handle.resolve(7);
    /// assert_eq!(operation.await, Ok(7));
    /// # });
    /// ```
    #[must_use]
    pub fn deferred<T, X>() -> (DeferredHandle<T, X>, BoxFuture<'static, Result<T, X>>)
    where
        T: Send + 'static,
        X: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let operation = Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => futures::future::pending().await,
            }
        });

        (DeferredHandle { tx }, operation)
    }

    /// Errors produced by [`MockSupplier`]
    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum MockError {
        /// No canned response for the key
        #[error("404: no canned response for `{0}`")]
        NotFound(String),
        /// Canned failure
        #[error("{0}")]
        Failed(String),
    }

    impl FailureSource for MockError {
        fn failure_kind(&self) -> FailureKind {
            match self {
                Self::NotFound(_) => FailureKind::NotFound,
                Self::Failed(_) => FailureKind::Other,
            }
        }
    }

    /// Operation supplier with canned responses
    ///
    /// Records every key it was asked for.
    #[derive(Debug, Clone)]
    pub struct MockSupplier<T> {
        responses: HashMap<String, Result<T, MockError>>,
        delays: HashMap<String, Duration>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl<T> MockSupplier<T> {
        /// Create a supplier with no canned responses
        #[must_use]
        pub fn new() -> Self {
            Self {
                responses: HashMap::new(),
                delays: HashMap::new(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Answer `key` with `value`
        #[must_use]
        pub fn with_value(mut self, key: impl Into<String>, value: T) -> Self {
            self.responses.insert(key.into(), Ok(value));
            self
        }

        /// Answer `key` with a failure carrying `message`
        #[must_use]
        pub fn with_failure(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
            self.responses
                .insert(key.into(), Err(MockError::Failed(message.into())));
            self
        }

        /// Delay the answer for `key`
        #[must_use]
        pub fn with_delay(mut self, key: impl Into<String>, delay: Duration) -> Self {
            self.delays.insert(key.into(), delay);
            self
        }

        /// Keys requested so far, in order
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .map(|calls| calls.clone())
                .unwrap_or_default()
        }
    }

    impl<T> Default for MockSupplier<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> OperationSupplier for MockSupplier<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        type Output = T;
        type Error = MockError;

        fn supply(&self, key: &str) -> BoxFuture<'static, Result<T, MockError>> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(key.to_string());
            }

            let response = self
                .responses
                .get(key)
                .cloned()
                .unwrap_or_else(|| Err(MockError::NotFound(key.to_string())));
            let delay = self.delays.get(key).copied();

            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                response
            })
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    /// Install a test-friendly tracing subscriber
    ///
    /// Honors `RUST_LOG`; safe to call from many tests.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "async_lifecycle_runtime=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{deferred, DeferredHandle, MockError, MockSupplier};

#[cfg(test)]
mod tests {
    use super::*;
    use async_lifecycle_core::environment::OperationSupplier;
    use async_lifecycle_core::failure::{FailureKind, FailureSource};

    #[tokio::test]
    async fn test_mock_supplier_canned_value() {
        let supplier = MockSupplier::new().with_value("007", 7_u32);

        assert_eq!(supplier.supply("007").await, Ok(7));
        assert_eq!(supplier.calls(), vec!["007".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_supplier_unknown_key() {
        let supplier = MockSupplier::<u32>::new();

        let result = supplier.supply("123").await;
        assert_eq!(result, Err(MockError::NotFound("123".to_string())));
        assert_eq!(
            result.err().map(|e| e.failure_kind()),
            Some(FailureKind::NotFound)
        );
    }

    #[tokio::test]
    async fn test_deferred_reject() {
        let (handle, operation) = deferred::<u32, String>();

        assert!(handle.reject("boom".to_string()));
        assert_eq!(operation.await, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_deferred_dropped_handle_never_settles() {
        let (handle, operation) = deferred::<u32, String>();
        drop(handle);

        let result = tokio::time::timeout(std::time::Duration::from_millis(20), operation).await;
        assert!(result.is_err());
    }
}
