//! Ordered stage-chain router for restbind.
//!
//! Each [`Route`] pairs match criteria (methods, a literal or regex path,
//! consumed/produced media types) with an ordered list of [`Stage`]s.
//! [`Router::handle`] walks the routes in order, running every one that matches
//! until a stage finishes the request.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::Method;
//! use restbind_core::HttpRequest;
//! use restbind_router::{Flow, FnStage, Route, Router, RoutingContext};
//!
//! let mut router = Router::new();
//! router.route(
//!     Route::path("/users/:id")
//!         .unwrap()
//!         .method(Method::GET)
//!         .stage(Arc::new(FnStage::new("hello", |ctx: &mut RoutingContext| {
//!             let id = ctx.parts().params.get("id").unwrap_or_default().to_string();
//!             ctx.response_mut().end_with(format!("user {id}"))?;
//!             Ok(Flow::Done)
//!         }))),
//! );
//!
//! let request = HttpRequest::build(Method::GET, "/users/7").unwrap();
//! let response = tokio_test::block_on(router.handle(request));
//! assert_eq!(response.body(), b"user 7");
//! ```

mod context;
mod params;
mod path;
mod router;
mod stage;

pub use context::{RequestParts, RoutingContext};
pub use params::Params;
pub use path::{PathMatch, PathMatcher, SegmentKind};
pub use router::{Route, Router};
pub use stage::{FailureHandler, FnStage, Flow, PlainFailureHandler, Stage};
