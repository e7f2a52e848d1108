//! Typed configuration for restbind services.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! [`RestbindConfig`] holds three sections:
//!
//! - [`ServerSection`] - bind address, timeouts and body limit
//! - [`DispatchSection`] - blocking pool size and JSON error bodies
//! - [`LoggingSection`] - filter directives and output format
//!
//! # Example
//!
//! ```no_run
//! use restbind_config::ConfigLoader;
//! use restbind_server::{RestRouter, Server};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("restbind.toml")?
//!     .with_env_prefix("RESTBIND")
//!     .load()?;
//!
//! restbind_telemetry::init_logging(&config.log_config())?;
//! let mut rest = RestRouter::new();
//! config.configure(&mut rest)?;
//!
//! let server = config.server_config();
//! server.runtime()?.block_on(Server::new(rest, server.clone()).run())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//! max_body_bytes = 2097152
//!
//! [dispatch]
//! blocking_threads = 512
//! json_errors = false
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! include_location = false
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every key can be overridden with `PREFIX__SECTION__KEY`:
//!
//! - `RESTBIND__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `RESTBIND__DISPATCH__BLOCKING_THREADS=64`
//! - `RESTBIND__LOGGING__FORMAT=pretty`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{RestbindConfig, RestbindConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, Format};
pub use schema::{DispatchSection, LoggingSection, ServerSection};
