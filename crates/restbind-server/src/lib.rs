//! # Restbind Server
//!
//! The dispatch engine behind restbind routes and the HTTP transport serving it.
//!
//! - [`RestRouter`] registers endpoints as stage chains and owns the plugin registry
//! - [`DispatchStage`] binds arguments, invokes handlers and writes their results
//! - [`ErrorTranslator`] turns every failure into exactly one response
//! - [`EventExecutor`] runs the lifecycle events declared on a route
//! - [`Server`] serves a router over HTTP/1.1 with graceful shutdown

#![doc(html_root_url = "https://docs.rs/restbind-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod engine;
mod events;
mod exception;
mod not_found;
mod pipeline;
mod rest_router;
mod server;
pub mod shutdown;
mod translator;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use engine::Engine;
pub use events::EventExecutor;
pub use exception::{GenericExceptionHandler, JsonExceptionHandler};
pub use not_found::NotFoundStage;
pub use pipeline::DispatchStage;
pub use rest_router::RestRouter;
pub use server::{ResponseBody, Server, ServerError};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
pub use translator::{classify, ErrorTranslator};
