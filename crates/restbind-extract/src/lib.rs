//! # Restbind Extract
//!
//! Plugin registries, built-in codecs and argument binding.
//!
//! | Item | Role |
//! |------|------|
//! | [`Registry`] | Readers, writers, exception handlers and context providers of one router |
//! | [`PluginRegistry`] | Registration-ordered entries with most-specific-type resolution |
//! | [`ArgumentBinder`] | Turns a request into the [`Arguments`](restbind_core::Arguments) of a route |
//! | [`JsonBodyReader`], [`TextBodyReader`], [`TypedJsonReader`] | Body readers |
//! | [`GenericResponseWriter`], [`JsonResponseWriter`], [`NotFoundResponseWriter`] | Response writers |
//!
//! ## Example
//!
//! ```rust
//! use http::Method;
//! use restbind_core::{Container, HttpRequest, MethodParameter, RouteDefinition};
//! use restbind_extract::{ArgumentBinder, Registry};
//! use restbind_router::RequestParts;
//!
//! let definition = RouteDefinition::get("/search")
//!     .param(MethodParameter::query::<String>("q"))
//!     .build()
//!     .unwrap();
//! let registry = Registry::with_defaults();
//! let container = Container::new();
//!
//! let mut parts = RequestParts::new(HttpRequest::build(Method::GET, "/search?q=rust").unwrap());
//! let args = ArgumentBinder::new(&registry, &container)
//!     .bind(&definition, &mut parts)
//!     .unwrap();
//! assert_eq!(args.get::<String>("q").map(String::as_str), Some("rust"));
//! ```

#![doc(html_root_url = "https://docs.rs/restbind-extract/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod binder;
mod parse;
mod reader;
mod registry;
mod writer;

pub use binder::{body_media, ArgumentBinder};
pub use parse::{parse_cookies, parse_form, parse_query};
pub use reader::{JsonBodyReader, TextBodyReader, TypedJsonReader};
pub use registry::{best_match, Direction, PluginRegistry, Registry, RegistryState, Resolved};
pub use writer::{GenericResponseWriter, JsonResponseWriter, NotFoundResponseWriter};
