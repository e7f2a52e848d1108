//! Logging setup for restbind services.
//!
//! Every restbind crate logs through `tracing`. This crate installs the
//! subscriber that turns those events into output: JSON lines for
//! production, a pretty multi-line layout while developing.
//!
//! # Example
//!
//! ```rust,no_run
//! use restbind_telemetry::{init_logging, LogConfig, LogFormat};
//!
//! let config = LogConfig {
//!     level: "info,restbind_server=debug".to_string(),
//!     format: LogFormat::Json,
//!     ..LogConfig::default()
//! };
//! init_logging(&config)?;
//!
//! tracing::info!(route = "GET /users/:id", "route registered");
//! # Ok::<(), restbind_telemetry::TelemetryError>(())
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
