//! # Restbind Middleware
//!
//! Router stages that route registration installs in front of a dispatch
//! handler, plus the global stages installed by the router itself.
//!
//! ## Per-route stages
//!
//! ```text
//! consumes/produces filter → order → [Body] → [Cookie] → [Security] → dispatch
//! ```
//!
//! | Stage | Installed when |
//! |-------|----------------|
//! | [`BodyStage`] | the route declares a body or form parameter |
//! | [`CookieStage`] | the route declares a cookie parameter |
//! | [`SecurityStage`] | the route has a security policy |
//!
//! ## Global stages
//!
//! | Stage | Order |
//! |-------|-------|
//! | [`CorsStage`] | [`ORDER_CORS_HANDLER`] |
//! | [`ContextProviderStage`] | [`ORDER_PROVIDER_HANDLER`] |

#![doc(html_root_url = "https://docs.rs/restbind-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod stages;

pub use stages::body::BodyStage;
pub use stages::cookie::CookieStage;
pub use stages::cors::{CorsBuilder, CorsStage, ORDER_CORS_HANDLER};
pub use stages::provider::{ContextProviderStage, ORDER_PROVIDER_HANDLER};
pub use stages::security::SecurityStage;
