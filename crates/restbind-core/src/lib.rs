//! # Restbind Core
//!
//! Core types and contracts for the restbind dispatch engine.
//!
//! - [`TypeDescriptor`] / [`Typed`] - declared type tags and the compatibility checker
//! - [`RouteDefinition`] / [`Endpoint`] - immutable endpoint descriptions bound to handlers
//! - [`Payload`] / [`Cause`] - typed success results and failure causes
//! - [`RestError`] - the error taxonomy shared by every stage
//! - [`HttpRequest`] / [`HttpResponse`] - request/response model with a single-end guarantee
//! - [`plugin`] - reader, writer, exception handler, context provider and event contracts

#![doc(html_root_url = "https://docs.rs/restbind-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::future::Future;
use std::pin::Pin;

mod arguments;
mod context;
mod definition;
pub mod di;
mod error;
mod exchange;
mod media;
pub mod plugin;
mod types;
mod user;
pub mod validation;
mod value;

pub use arguments::{ArgValue, Arguments};
pub use context::{ContextData, ContextValue};
pub use definition::{
    AsyncFn, BlockingFn, Endpoint, EventBinding, EventTrigger, HandlerFn, JsonConverter,
    MethodParameter, ParamSource, RouteDefinition, RouteDefinitionBuilder, RoutePath,
    SecurityPolicy, TextConverter,
};
pub use di::{Construct, Container};
pub use error::{ErrorKind, RestError, RestResult, Violation};
pub use exchange::{HttpRequest, HttpResponse};
pub use media::MediaType;
pub use types::{AnyFailure, Anything, Sequence, TypeDescriptor, TypeTag, Typed};
pub use user::{CurrentUser, RoleUser, User};
pub use validation::Validator;
pub use value::{BoxedValue, Cause, FailureMessage, Opaque, Payload};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
