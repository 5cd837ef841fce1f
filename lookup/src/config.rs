//! Configuration for the record lookup
//!
//! Everything can be overridden from the environment:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `RECORD_LOOKUP_BASE_URL` | endpoint records are fetched from | `http://127.0.0.1:8080/records` |
//! | `RECORD_LOOKUP_TIMEOUT_MS` | per-request timeout | `5000` |
//! | `RECORD_LOOKUP_DELAY_MS` | artificial delay before each request | `0` |
//! | `RECORD_LOOKUP_SETTLEMENT` | `latest_started` or `latest_settled` | `latest_started` |

use async_lifecycle_runtime::{RunnerConfig, SettlementPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Variable holding the base URL
pub const BASE_URL_VAR: &str = "RECORD_LOOKUP_BASE_URL";
/// Variable holding the request timeout in milliseconds
pub const TIMEOUT_VAR: &str = "RECORD_LOOKUP_TIMEOUT_MS";
/// Variable holding the artificial delay in milliseconds
pub const DELAY_VAR: &str = "RECORD_LOOKUP_DELAY_MS";
/// Variable holding the settlement policy
pub const SETTLEMENT_VAR: &str = "RECORD_LOOKUP_SETTLEMENT";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/records";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Failed to parse {var}: {message}")]
    ParseError {
        /// Variable name
        var: &'static str,
        /// What went wrong
        message: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Record lookup configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Endpoint records are fetched from (`GET {base_url}/{identifier}`)
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Delay applied before every request
    pub artificial_delay: Duration,
    /// Which overlapping settlement wins
    pub settlement_policy: SettlementPolicy,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            artificial_delay: Duration::ZERO,
            settlement_policy: SettlementPolicy::default(),
        }
    }
}

impl LookupConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the result
    /// fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup(BASE_URL_VAR) {
            config.base_url = base_url.trim().trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup(TIMEOUT_VAR) {
            config.request_timeout = parse_millis(TIMEOUT_VAR, &raw)?;
        }
        if let Some(raw) = lookup(DELAY_VAR) {
            config.artificial_delay = parse_millis(DELAY_VAR, &raw)?;
        }
        if let Some(raw) = lookup(SETTLEMENT_VAR) {
            config.settlement_policy = raw
                .parse()
                .map_err(|message| ConfigError::ParseError {
                    var: SETTLEMENT_VAR,
                    message,
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the artificial delay
    #[must_use]
    pub const fn with_artificial_delay(mut self, delay: Duration) -> Self {
        self.artificial_delay = delay;
        self
    }

    /// Set the settlement policy
    #[must_use]
    pub const fn with_settlement_policy(mut self, policy: SettlementPolicy) -> Self {
        self.settlement_policy = policy;
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url cannot be empty".to_string(),
            ));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "base_url must be an http(s) URL, got `{}`",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Runner configuration derived from this lookup configuration
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::default().with_settlement_policy(self.settlement_policy)
    }
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::ParseError {
            var,
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<LookupConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        LookupConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config, LookupConfig::default());
        assert_eq!(config.settlement_policy, SettlementPolicy::LatestStarted);
        assert!(config.artificial_delay.is_zero());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            (BASE_URL_VAR, "https://records.example.com/api/"),
            (TIMEOUT_VAR, "250"),
            (DELAY_VAR, "1000"),
            (SETTLEMENT_VAR, "latest-settled"),
        ])
        .unwrap();

        assert_eq!(config.base_url, "https://records.example.com/api");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.artificial_delay, Duration::from_secs(1));
        assert_eq!(
            config.runner_config().settlement_policy,
            SettlementPolicy::LatestSettled
        );
    }

    #[test]
    fn test_malformed_number() {
        let error = load(&[(DELAY_VAR, "soon")]).unwrap_err();
        assert!(matches!(error, ConfigError::ParseError { var: DELAY_VAR, .. }));
    }

    #[test]
    fn test_unknown_policy() {
        assert!(load(&[(SETTLEMENT_VAR, "first")]).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(load(&[(BASE_URL_VAR, "records.local")]).is_err());
        assert!(load(&[(TIMEOUT_VAR, "0")]).is_err());
    }
}
