//! # Record Lookup
//!
//! Looks up item records by identifier, driving each lookup through the
//! async lifecycle (`Idle → Pending → Resolved | Rejected`).
//!
//! ## Components
//!
//! - **identifier**: normalizes raw input (`"7"` → `"007"`)
//! - **client**: HTTP [`OperationSupplier`](async_lifecycle_core::environment::OperationSupplier)
//! - **host**: [`OperationHost`] maps lifecycle state onto a [`View`]
//! - **boundary**: [`FailureBoundary`] catches raised failures and offers a reset
//! - **shell**: [`submit`] handles one line of terminal input
//!
//! ## Example
//!
//! ```ignore
//! let config = LookupConfig::from_env()?;
//! let supplier = HttpRecordSupplier::new(&config)?;
//! let mut boundary = FailureBoundary::new(OperationHost::with_config(supplier, config.runner_config()));
//!
//! if let Some(mut handle) = boundary.host_mut().set_identifier(normalize("7")?).await? {
//!     handle.wait().await;
//! }
//! println!("{}", boundary.render());
//! ```

pub mod boundary;
pub mod client;
pub mod config;
pub mod host;
pub mod identifier;
pub mod record;
pub mod shell;

pub use boundary::{BoundaryView, FailureBoundary};
pub use client::{HttpRecordSupplier, LookupError};
pub use config::{ConfigError, LookupConfig};
pub use host::{HostState, LookupFailure, OperationHost, View};
pub use identifier::{normalize, Identifier, IdentifierError};
pub use record::ItemRecord;
pub use shell::{submit, Submission};
