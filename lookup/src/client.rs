//! HTTP record supplier
//!
//! Fetches `GET {base_url}/{identifier}` and decodes an [`ItemRecord`].

use crate::config::LookupConfig;
use crate::record::ItemRecord;
use async_lifecycle_core::environment::OperationSupplier;
use async_lifecycle_core::failure::{FailureKind, FailureSource};
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching a record
///
/// These carry the technical detail and are only logged; the lifecycle
/// keeps nothing but their [`FailureKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The endpoint has no record for the identifier
    #[error("No record for `{0}` (404)")]
    NotFound(String),

    /// The endpoint answered with an unexpected status
    #[error("Unexpected status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The request never got a response
    #[error("Request failed: {0}")]
    Network(String),

    /// The response body was not a record
    #[error("Response parsing failed: {0}")]
    Malformed(String),
}

impl FailureSource for LookupError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Network(_) => FailureKind::Network,
            Self::Malformed(_) => FailureKind::Malformed,
            Self::Status { .. } => FailureKind::Other,
        }
    }
}

/// Record supplier backed by an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpRecordSupplier {
    client: Client,
    base_url: String,
    delay: Duration,
}

impl HttpRecordSupplier {
    /// Create a supplier from configuration
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LookupError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            delay: config.artificial_delay,
        })
    }

    /// URL a given key is fetched from
    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url)
    }

    /// Fetch one record
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] for network failures, non-success statuses,
    /// or bodies that are not a record.
    pub async fn fetch(&self, key: &str) -> Result<ItemRecord, LookupError> {
        fetch(self.client.clone(), self.url_for(key), key.to_string(), self.delay).await
    }
}

impl OperationSupplier for HttpRecordSupplier {
    type Output = ItemRecord;
    type Error = LookupError;

    fn supply(&self, key: &str) -> BoxFuture<'static, Result<ItemRecord, LookupError>> {
        Box::pin(fetch(
            self.client.clone(),
            self.url_for(key),
            key.to_string(),
            self.delay,
        ))
    }
}

#[tracing::instrument(skip(client, delay), name = "fetch_record")]
async fn fetch(
    client: Client,
    url: String,
    key: String,
    delay: Duration,
) -> Result<ItemRecord, LookupError> {
    if !delay.is_zero() {
        tracing::debug!(delay_ms = delay.as_millis(), "Applying artificial delay");
        tokio::time::sleep(delay).await;
    }

    let response = client.get(&url).send().await.map_err(|e| {
        metrics::counter!("lookup.requests", "outcome" => "network").increment(1);
        LookupError::Network(e.to_string())
    })?;

    match response.status() {
        StatusCode::OK => {
            let body = response
                .bytes()
                .await
                .map_err(|e| LookupError::Network(e.to_string()))?;
            let record = serde_json::from_slice::<ItemRecord>(&body).map_err(|e| {
                metrics::counter!("lookup.requests", "outcome" => "malformed").increment(1);
                LookupError::Malformed(e.to_string())
            })?;

            metrics::counter!("lookup.requests", "outcome" => "ok").increment(1);
            tracing::debug!(number = %record.number, "Record fetched");
            Ok(record)
        },
        StatusCode::NOT_FOUND => {
            metrics::counter!("lookup.requests", "outcome" => "not_found").increment(1);
            Err(LookupError::NotFound(key))
        },
        status => {
            metrics::counter!("lookup.requests", "outcome" => "status").increment(1);
            let body = response.text().await.unwrap_or_default();
            Err(LookupError::Status {
                status: status.as_u16(),
                body,
            })
        },
    }
}
