//! # Restbind
//!
//! **Typed REST dispatch for hyper services**
//!
//! Restbind turns endpoint descriptions into routes and takes every request
//! through the same pipeline:
//!
//! - **Registration checks** – readers and writers are matched against the
//!   declared body and return types before a route goes live
//! - **Argument binding** – path, query, header, cookie, form, matrix, body
//!   and context values converted into the declared types
//! - **Security** – role lists, permit-all and deny-all per route
//! - **Blocking or async handlers** – blocking ones run on a worker pool,
//!   optionally one at a time per route
//! - **Error translation** – failures classified into status codes and
//!   written by the most specific exception handler
//! - **Lifecycle events** – callbacks keyed on status, outcome and type
//!
//! ## Quick Start
//!
//! ```rust
//! use restbind::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut rest = RestRouter::new();
//! rest.register(
//!     RouteDefinition::get("/greet/:name")
//!         .param(MethodParameter::path::<String>("name"))
//!         .param(MethodParameter::query::<u32>("times").default_value("1"))
//!         .returns::<String>()
//!         .blocking(|args| {
//!             let name = args.required::<String>("name")?;
//!             let times = *args.required::<u32>("times")?;
//!             Ok(Payload::some(vec![format!("hi {name}"); times as usize].join(" ")))
//!         })?,
//! )?;
//!
//! let response = rest
//!     .handle(HttpRequest::build(http::Method::GET, "/greet/ada?times=2")?)
//!     .await;
//! assert_eq!(response.body(), b"hi ada hi ada");
//! # Ok::<(), RestError>(())
//! # }).unwrap();
//! ```
//!
//! ## Architecture
//!
//! Registration installs an ordered stage chain per route:
//!
//! ```text
//! Request → [CORS] → [Context providers] → Body → Cookies → Security → Dispatch
//!                                                                        ↓
//!                       Response ← Writer ← Return validation ← Handler ←┘
//!
//! any failure → Error translator → exception handler → events → end
//! ```

#![doc(html_root_url = "https://docs.rs/restbind/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use restbind_core as core;

// Re-export server types
pub use restbind_server as server;

// Re-export middleware stages
pub use restbind_middleware as middleware;

// Re-export router types
pub use restbind_router as router;

// Re-export plugin registries and binding
pub use restbind_extract as extract;

// Re-export configuration
pub use restbind_config as config;

// Re-export logging setup
pub use restbind_telemetry as telemetry;

// Re-export the type registration macro
pub use restbind_core::typed;

/// Prelude module for convenient imports.
///
/// ```rust
/// use restbind::prelude::*;
///
/// let rest = RestRouter::new();
/// assert_eq!(rest.registry_state(), RegistryState::Building);
/// ```
pub mod prelude {
    pub use restbind_core::{
        typed, AnyFailure, Anything, Arguments, Cause, Container, Endpoint, EventBinding, EventTrigger,
        HttpRequest, HttpResponse, MediaType, MethodParameter, Payload, RestError, RestResult, RoleUser,
        RouteDefinition, SecurityPolicy, TypeDescriptor, Typed, User, Validator, Violation,
    };

    // Plugin contracts and registration entries
    pub use restbind_core::plugin::{
        ContextProvider, EventEntry, ExceptionHandler, HandlerEntry, Outcome, ProviderEntry, ReaderEntry,
        ResponseWriter, RestEvent, ValueReader, WriterEntry,
    };

    // Built-in plugins and the registry
    pub use restbind_extract::{
        GenericResponseWriter, JsonBodyReader, JsonResponseWriter, NotFoundResponseWriter, Registry,
        RegistryState, TextBodyReader, TypedJsonReader,
    };

    pub use restbind_middleware::CorsStage;

    pub use restbind_server::{
        GenericExceptionHandler, JsonExceptionHandler, RestRouter, Server, ServerConfig, ShutdownSignal,
    };

    pub use restbind_config::{ConfigLoader, RestbindConfig};

    pub use restbind_telemetry::{init_logging, LogConfig, LogFormat};
}
