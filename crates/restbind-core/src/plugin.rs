//! Plugin capability traits and registration entries.
//!
//! Every plugin kind is a trait object: [`ValueReader`], [`ResponseWriter`],
//! [`ExceptionHandler`], [`ContextProvider`] and [`RestEvent`]. A
//! [`PluginEntry`] pairs a plugin with the type it declares it handles (and,
//! for codecs, a media type). Plugins are either shared instances or built on
//! demand through the injection [`Container`].
//!
//! ```
//! use restbind_core::plugin::{ResponseWriter, WriterEntry};
//! use restbind_core::{HttpRequest, HttpResponse, MediaType, Payload, RestResult};
//!
//! struct Shout;
//!
//! impl ResponseWriter for Shout {
//!     fn write(&self, result: Option<&Payload>, _: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
//!         let text = result.map(Payload::to_text).unwrap_or_default();
//!         response.end_with(text.to_uppercase())
//!     }
//! }
//!
//! let entry = WriterEntry::of::<String, _>(Shout).with_media(MediaType::text());
//! assert_eq!(entry.media(), Some(&MediaType::text()));
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::StatusCode;

use crate::context::ContextValue;
use crate::definition::RouteDefinition;
use crate::di::{Construct, Container};
use crate::error::RestResult;
use crate::exchange::{HttpRequest, HttpResponse};
use crate::media::MediaType;
use crate::types::{TypeDescriptor, Typed};
use crate::value::{BoxedValue, Cause, Payload};

/// What a reader produced from a request body.
pub enum ReadValue {
    /// A value already of the parameter's declared type.
    Typed(BoxedValue),
    /// A JSON document, deserialized into the declared type by the binder.
    Json(serde_json::Value),
    /// Raw text, converted into the declared type by the binder.
    Text(String),
}

impl fmt::Debug for ReadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typed(_) => f.write_str("Typed(..)"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
        }
    }
}

/// Converts a request body into a value.
pub trait ValueReader: Send + Sync {
    /// Reads `body`.
    fn read(&self, body: &Bytes, request: &HttpRequest) -> RestResult<ReadValue>;
}

/// Serializes a handler result into the response.
pub trait ResponseWriter: Send + Sync {
    /// Adds route-declared headers before writing.
    fn add_response_headers(
        &self,
        definition: Option<&RouteDefinition>,
        response: &mut HttpResponse,
    ) -> RestResult<()> {
        default_response_headers(definition, response)
    }

    /// Writes `result`; `None` is a null/empty success.
    fn write(
        &self,
        result: Option<&Payload>,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> RestResult<()>;
}

/// Writes an error body for a failure cause.
pub trait ExceptionHandler: Send + Sync {
    /// Adds route-declared headers before writing.
    fn add_response_headers(
        &self,
        definition: Option<&RouteDefinition>,
        response: &mut HttpResponse,
    ) -> RestResult<()> {
        default_response_headers(definition, response)
    }

    /// Writes the error body. The status is already set.
    fn write(&self, cause: &Cause, request: &HttpRequest, response: &mut HttpResponse) -> RestResult<()>;
}

/// Supplies a request-scoped value.
pub trait ContextProvider: Send + Sync {
    /// Produces a value for `request`, or `None` when nothing applies.
    fn provide(&self, request: &HttpRequest) -> RestResult<Option<ContextValue>>;
}

/// The outcome an event reacts to.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// A non-null success result.
    Success(&'a Payload),
    /// A failure cause.
    Failure(&'a Cause),
}

impl Outcome<'_> {
    /// Runtime type of the result or cause.
    #[must_use]
    pub const fn descriptor(&self) -> &TypeDescriptor {
        match self {
            Self::Success(payload) => payload.descriptor(),
            Self::Failure(cause) => cause.descriptor(),
        }
    }

    /// Whether this is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// A lifecycle handler run after the response is produced.
pub trait RestEvent: Send + Sync {
    /// Reacts to `outcome`; `status` is the final response status.
    fn execute(&self, outcome: Outcome<'_>, status: StatusCode, request: &HttpRequest) -> RestResult<()>;
}

/// Adds the definition's response headers and its first concrete produced
/// media type as `Content-Type`, never overwriting headers already set.
pub fn default_response_headers(
    definition: Option<&RouteDefinition>,
    response: &mut HttpResponse,
) -> RestResult<()> {
    let Some(definition) = definition else {
        return Ok(());
    };
    if response.is_ended() {
        return Ok(());
    }
    for (name, value) in definition.response_headers() {
        if response.header(name).is_none() {
            response.put_header(name, value)?;
        }
    }
    if response.headers().get(CONTENT_TYPE).is_none() {
        if let Some(media) = definition.produces().iter().find(|m| !m.is_wildcard()) {
            response.put_header(CONTENT_TYPE.as_str(), &media.to_string())?;
        }
    }
    Ok(())
}

type Factory<P> = Arc<dyn Fn(&Container) -> RestResult<Arc<P>> + Send + Sync>;

/// A plugin instance, or a recipe to construct one.
pub enum PluginRef<P: ?Sized> {
    /// Shared instance.
    Instance(Arc<P>),
    /// Built through the container on every resolution.
    Factory(Factory<P>),
}

impl<P: ?Sized> Clone for PluginRef<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(instance) => Self::Instance(Arc::clone(instance)),
            Self::Factory(factory) => Self::Factory(Arc::clone(factory)),
        }
    }
}

impl<P: ?Sized> PluginRef<P> {
    /// Returns the instance, constructing it if needed.
    pub fn get(&self, container: &Container) -> RestResult<Arc<P>> {
        match self {
            Self::Instance(instance) => Ok(Arc::clone(instance)),
            Self::Factory(factory) => factory(container),
        }
    }
}

/// A registered plugin with its declared target type and media type.
pub struct PluginEntry<P: ?Sized> {
    target: TypeDescriptor,
    media: Option<MediaType>,
    name: &'static str,
    plugin: PluginRef<P>,
}

impl<P: ?Sized> Clone for PluginEntry<P> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            media: self.media.clone(),
            name: self.name,
            plugin: self.plugin.clone(),
        }
    }
}

impl<P: ?Sized> PluginEntry<P> {
    /// Entry for a shared instance.
    pub fn from_instance(target: TypeDescriptor, name: &'static str, plugin: Arc<P>) -> Self {
        Self {
            target,
            media: None,
            name,
            plugin: PluginRef::Instance(plugin),
        }
    }

    /// Entry for a plugin constructed on demand.
    pub fn from_factory(
        target: TypeDescriptor,
        name: &'static str,
        factory: impl Fn(&Container) -> RestResult<Arc<P>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            target,
            media: None,
            name,
            plugin: PluginRef::Factory(Arc::new(factory)),
        }
    }

    /// Restricts the entry to a media type.
    #[must_use]
    pub fn with_media(mut self, media: MediaType) -> Self {
        self.media = (!media.is_wildcard()).then_some(media);
        self
    }

    /// Overrides the declared target type.
    #[must_use]
    pub fn with_target(mut self, target: TypeDescriptor) -> Self {
        self.target = target;
        self
    }

    /// Declared target type.
    #[must_use]
    pub const fn target(&self) -> &TypeDescriptor {
        &self.target
    }

    /// Media type, `None` meaning any.
    #[must_use]
    pub const fn media(&self) -> Option<&MediaType> {
        self.media.as_ref()
    }

    /// Plugin type name, for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Position of the first of `accepted` this entry serves.
    ///
    /// Entries without a media type serve everything and rank after concrete
    /// matches. Entries with one are never picked for a bare `*/*`.
    #[must_use]
    pub fn accepts_media(&self, accepted: &[MediaType]) -> Option<usize> {
        match &self.media {
            None => Some(accepted.len()),
            Some(media) => accepted
                .iter()
                .position(|candidate| !candidate.is_wildcard() && media.matches(candidate)),
        }
    }

    /// Returns the plugin instance.
    pub fn get(&self, container: &Container) -> RestResult<Arc<P>> {
        self.plugin.get(container)
    }
}

impl<P: ?Sized> fmt::Debug for PluginEntry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("plugin", &self.name)
            .field("target", &self.target.to_string())
            .field("media", &self.media.as_ref().map(ToString::to_string))
            .finish()
    }
}

macro_rules! entry_constructors {
    ($($alias:ident => $kind:ident),+ $(,)?) => {$(
        #[doc = concat!("Registration entry for a [`", stringify!($kind), "`].")]
        pub type $alias = PluginEntry<dyn $kind>;

        impl PluginEntry<dyn $kind> {
            /// Entry for `plugin`, declared to handle `T`.
            pub fn of<T: Typed, K: $kind + 'static>(plugin: K) -> Self {
                Self::from_instance(
                    T::descriptor(),
                    std::any::type_name::<K>(),
                    Arc::new(plugin) as Arc<dyn $kind>,
                )
            }

            /// Entry constructing `K` through the container, declared to handle `T`.
            pub fn constructed<T: Typed, K: $kind + Construct + 'static>() -> Self {
                Self::from_factory(T::descriptor(), std::any::type_name::<K>(), |container| {
                    let plugin: K = container.construct()?;
                    Ok(Arc::new(plugin) as Arc<dyn $kind>)
                })
            }
        }
    )+};
}

entry_constructors! {
    ReaderEntry => ValueReader,
    WriterEntry => ResponseWriter,
    HandlerEntry => ExceptionHandler,
    ProviderEntry => ContextProvider,
    EventEntry => RestEvent,
}
