//! Route definitions: the immutable description of one endpoint.
//!
//! A [`RouteDefinition`] is assembled with [`RouteDefinitionBuilder`] and paired
//! with a handler function into an [`Endpoint`]. Definitions never change once
//! built; the only definitions created at request time are the synthetic ones
//! describing unmatched requests ([`RouteDefinition::from_request`]).
//!
//! ```
//! use http::Method;
//! use restbind_core::{MethodParameter, Payload, RouteDefinition, SecurityPolicy};
//!
//! let endpoint = RouteDefinition::builder(Method::GET, "/widgets/:id")
//!     .produces("application/json")
//!     .param(MethodParameter::path::<u64>("id"))
//!     .returns::<String>()
//!     .security(SecurityPolicy::roles(["reader"]))
//!     .blocking(|args| {
//!         let id = args.required::<u64>("id")?;
//!         Ok(Payload::some(format!("widget {id}")))
//!     })
//!     .unwrap();
//!
//! assert_eq!(endpoint.definition().to_string(), "GET /widgets/:id");
//! assert!(!endpoint.definition().is_async());
//! ```

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::arguments::Arguments;
use crate::error::{RestError, RestResult};
use crate::exchange::HttpRequest;
use crate::media::MediaType;
use crate::plugin::{EventEntry, HandlerEntry, ReaderEntry, WriterEntry};
use crate::types::{TypeDescriptor, Typed};
use crate::value::{BoxedValue, Payload};
use crate::BoxFuture;

/// Where a parameter value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    /// Path segment.
    Path,
    /// Query string.
    Query,
    /// Request header.
    Header,
    /// Cookie.
    Cookie,
    /// Request body, via a reader.
    Body,
    /// Matrix parameter (`;name=value` in the path).
    Matrix,
    /// Form field.
    Form,
    /// Value supplied by a context provider.
    Context,
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
            Self::Matrix => "matrix",
            Self::Form => "form",
            Self::Context => "context",
        };
        f.write_str(name)
    }
}

/// Converts raw text into a boxed parameter value.
pub type TextConverter = fn(&str) -> Result<BoxedValue, String>;

/// Converts a JSON document into a boxed parameter value.
pub type JsonConverter = fn(serde_json::Value) -> Result<BoxedValue, String>;

fn parse_text<T>(raw: &str) -> Result<BoxedValue, String>
where
    T: FromStr + Typed,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map(|value| Box::new(value) as BoxedValue)
        .map_err(|e| e.to_string())
}

fn body_from_json<T: DeserializeOwned + Typed>(value: serde_json::Value) -> Result<BoxedValue, String> {
    serde_json::from_value::<T>(value)
        .map(|value| Box::new(value) as BoxedValue)
        .map_err(|e| e.to_string())
}

fn body_from_text<T: DeserializeOwned + Typed>(raw: &str) -> Result<BoxedValue, String> {
    serde_json::from_value::<T>(serde_json::Value::String(raw.to_string()))
        .or_else(|_| serde_json::from_str::<T>(raw))
        .map(|value| Box::new(value) as BoxedValue)
        .map_err(|e| e.to_string())
}

/// One declared handler parameter.
#[derive(Clone)]
pub struct MethodParameter {
    source: ParamSource,
    name: String,
    descriptor: TypeDescriptor,
    default: Option<String>,
    required: bool,
    from_text: Option<TextConverter>,
    from_json: Option<JsonConverter>,
}

impl MethodParameter {
    /// A text-sourced parameter of type `T`.
    pub fn text<T>(source: ParamSource, name: impl Into<String>) -> Self
    where
        T: FromStr + Typed,
        T::Err: fmt::Display,
    {
        Self {
            source,
            name: name.into(),
            descriptor: T::descriptor(),
            default: None,
            required: true,
            from_text: Some(parse_text::<T>),
            from_json: None,
        }
    }

    /// A path parameter.
    pub fn path<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Typed,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Path, name)
    }

    /// A query parameter.
    pub fn query<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Typed,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Query, name)
    }

    /// A header parameter.
    pub fn header<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Typed,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Header, name)
    }

    /// A cookie parameter.
    pub fn cookie<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Typed,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Cookie, name)
    }

    /// A form field.
    pub fn form<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Typed,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Form, name)
    }

    /// A matrix parameter.
    pub fn matrix<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Typed,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Matrix, name)
    }

    /// The request body, read by the resolved reader.
    pub fn body<T: DeserializeOwned + Typed>() -> Self {
        Self {
            source: ParamSource::Body,
            name: "body".to_string(),
            descriptor: T::descriptor(),
            default: None,
            required: true,
            from_text: Some(body_from_text::<T>),
            from_json: Some(body_from_json::<T>),
        }
    }

    /// A body parameter read only by a reader producing `T` directly.
    pub fn raw_body<T: Typed>() -> Self {
        Self {
            source: ParamSource::Body,
            name: "body".to_string(),
            descriptor: T::descriptor(),
            default: None,
            required: true,
            from_text: None,
            from_json: None,
        }
    }

    /// A value provided by a context provider, named after its type.
    pub fn context<T: Typed>() -> Self {
        let descriptor = T::descriptor();
        Self {
            source: ParamSource::Context,
            name: descriptor.tag().short_name().to_string(),
            descriptor,
            default: None,
            required: true,
            from_text: None,
            from_json: None,
        }
    }

    /// Value used when the parameter is absent; makes it optional.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    /// Allows the parameter to be absent.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value source.
    #[must_use]
    pub const fn source(&self) -> ParamSource {
        self.source
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    #[must_use]
    pub const fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Default value.
    #[must_use]
    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Whether absence is an error.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Converts raw text into the declared type.
    pub fn convert_text(&self, raw: &str) -> RestResult<BoxedValue> {
        let convert = self.from_text.ok_or_else(|| self.conversion_error("no text conversion"))?;
        convert(raw).map_err(|reason| self.conversion_error(reason))
    }

    /// Converts a JSON document into the declared type.
    pub fn convert_json(&self, value: serde_json::Value) -> RestResult<BoxedValue> {
        let convert = self.from_json.ok_or_else(|| self.conversion_error("no JSON conversion"))?;
        convert(value).map_err(|reason| self.conversion_error(reason))
    }

    fn conversion_error(&self, reason: impl Into<String>) -> RestError {
        RestError::conversion(self.source, &self.name, self.descriptor.to_string(), reason)
    }
}

impl fmt::Debug for MethodParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodParameter")
            .field("source", &self.source)
            .field("name", &self.name)
            .field("type", &self.descriptor.to_string())
            .field("default", &self.default)
            .field("required", &self.required)
            .finish()
    }
}

/// Who may call a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityPolicy {
    /// Everyone, with or without a user.
    PermitAll,
    /// No one.
    DenyAll,
    /// Users holding at least one of the roles.
    RolesAllowed(Vec<String>),
}

impl SecurityPolicy {
    /// Policy allowing users with any of `roles`.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::RolesAllowed(roles.into_iter().map(Into::into).collect())
    }
}

/// When an event binding fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTrigger {
    /// The final status equals this one.
    OnStatus(http::StatusCode),
    /// Any 2xx status produced by a successful result.
    OnDefaultSuccess,
    /// Any failure.
    OnDefaultFailure,
}

/// A lifecycle event declared on a route.
#[derive(Clone, Debug)]
pub struct EventBinding {
    trigger: EventTrigger,
    required: Option<TypeDescriptor>,
    handler: EventEntry,
}

impl EventBinding {
    /// Binds `handler` to `trigger`; the outcome must fit the handler's declared type.
    #[must_use]
    pub const fn new(trigger: EventTrigger, handler: EventEntry) -> Self {
        Self {
            trigger,
            required: None,
            handler,
        }
    }

    /// Requires the outcome to fit `T` instead of the handler's declared type.
    #[must_use]
    pub fn requiring<T: Typed>(mut self) -> Self {
        self.required = Some(T::descriptor());
        self
    }

    /// Requires the outcome to fit `descriptor`.
    #[must_use]
    pub fn requiring_descriptor(mut self, descriptor: TypeDescriptor) -> Self {
        self.required = Some(descriptor);
        self
    }

    /// Trigger.
    #[must_use]
    pub const fn trigger(&self) -> EventTrigger {
        self.trigger
    }

    /// Explicitly required outcome type.
    #[must_use]
    pub const fn required_type(&self) -> Option<&TypeDescriptor> {
        self.required.as_ref()
    }

    /// Event handler entry.
    #[must_use]
    pub const fn handler(&self) -> &EventEntry {
        &self.handler
    }
}

/// A route path: a literal template or a regular expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePath {
    /// Literal path, possibly with `:name` / `{name}` segments and a trailing `*`.
    Literal(String),
    /// Regular expression; named groups become path parameters.
    Regex(String),
}

impl RoutePath {
    /// The path text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(path) | Self::Regex(path) => path,
        }
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable endpoint description.
#[derive(Clone, Debug)]
pub struct RouteDefinition {
    method: Method,
    path: RoutePath,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
    return_type: TypeDescriptor,
    parameters: Vec<MethodParameter>,
    security: Option<SecurityPolicy>,
    reader: Option<ReaderEntry>,
    writer: Option<WriterEntry>,
    exception_handlers: Vec<HandlerEntry>,
    response_headers: Vec<(String, String)>,
    order: Option<i32>,
    asynchronous: bool,
    ordered: bool,
    events: Vec<EventBinding>,
    check_compatibility: bool,
}

impl RouteDefinition {
    /// Starts a definition for `method` and a literal `path`.
    pub fn builder(method: Method, path: impl Into<String>) -> RouteDefinitionBuilder {
        RouteDefinitionBuilder::new(method, RoutePath::Literal(path.into()))
    }

    /// Starts a definition for `method` and a regular-expression path.
    pub fn regex(method: Method, pattern: impl Into<String>) -> RouteDefinitionBuilder {
        RouteDefinitionBuilder::new(method, RoutePath::Regex(pattern.into()))
    }

    /// Shorthand for a GET route.
    pub fn get(path: impl Into<String>) -> RouteDefinitionBuilder {
        Self::builder(Method::GET, path)
    }

    /// Shorthand for a POST route.
    pub fn post(path: impl Into<String>) -> RouteDefinitionBuilder {
        Self::builder(Method::POST, path)
    }

    /// Shorthand for a PUT route.
    pub fn put(path: impl Into<String>) -> RouteDefinitionBuilder {
        Self::builder(Method::PUT, path)
    }

    /// Shorthand for a DELETE route.
    pub fn delete(path: impl Into<String>) -> RouteDefinitionBuilder {
        Self::builder(Method::DELETE, path)
    }

    /// A synthetic definition describing an unmatched request.
    #[must_use]
    pub fn from_request(request: &HttpRequest) -> Self {
        let mut builder =
            RouteDefinitionBuilder::new(request.method().clone(), RoutePath::Literal(request.path().to_string()));
        builder.definition.consumes = request.content_type().into_iter().collect();
        builder.definition.produces = request
            .accept()
            .into_iter()
            .filter(|media| !media.is_wildcard())
            .collect();
        builder.definition
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path pattern.
    #[must_use]
    pub const fn path(&self) -> &RoutePath {
        &self.path
    }

    /// Accepted request media types.
    #[must_use]
    pub fn consumes(&self) -> &[MediaType] {
        &self.consumes
    }

    /// Produced response media types.
    #[must_use]
    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    /// Declared result type.
    #[must_use]
    pub const fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[MethodParameter] {
        &self.parameters
    }

    /// Security policy, if any.
    #[must_use]
    pub const fn security(&self) -> Option<&SecurityPolicy> {
        self.security.as_ref()
    }

    /// Reader override.
    #[must_use]
    pub const fn reader(&self) -> Option<&ReaderEntry> {
        self.reader.as_ref()
    }

    /// Writer override.
    #[must_use]
    pub const fn writer(&self) -> Option<&WriterEntry> {
        self.writer.as_ref()
    }

    /// Route-level exception handler overrides.
    #[must_use]
    pub fn exception_handlers(&self) -> &[HandlerEntry] {
        &self.exception_handlers
    }

    /// Headers added to every response.
    #[must_use]
    pub fn response_headers(&self) -> &[(String, String)] {
        &self.response_headers
    }

    /// Ordering hint for the router.
    #[must_use]
    pub const fn order(&self) -> Option<i32> {
        self.order
    }

    /// Whether the handler returns a pending computation.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.asynchronous
    }

    /// Whether blocking responses must be delivered in arrival order.
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Lifecycle event bindings in declaration order.
    #[must_use]
    pub fn events(&self) -> &[EventBinding] {
        &self.events
    }

    /// Whether codec types are checked against declared types.
    #[must_use]
    pub const fn check_compatibility(&self) -> bool {
        self.check_compatibility
    }

    /// The body parameter, if one is declared.
    #[must_use]
    pub fn body_parameter(&self) -> Option<&MethodParameter> {
        self.parameters.iter().find(|p| p.source() == ParamSource::Body)
    }

    /// Whether a body parameter is declared.
    #[must_use]
    pub fn has_body_parameter(&self) -> bool {
        self.body_parameter().is_some()
    }

    /// Whether requests for this method carry a body.
    #[must_use]
    pub fn request_has_body(&self) -> bool {
        !(self.method == Method::GET || self.method == Method::HEAD)
    }

    /// Whether any parameter comes from cookies.
    #[must_use]
    pub fn has_cookies(&self) -> bool {
        self.parameters.iter().any(|p| p.source() == ParamSource::Cookie)
    }

    /// Whether any parameter comes from form fields.
    #[must_use]
    pub fn has_form_parameters(&self) -> bool {
        self.parameters.iter().any(|p| p.source() == ParamSource::Form)
    }
}

impl fmt::Display for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A blocking handler function.
pub type BlockingFn = Arc<dyn Fn(Arguments) -> RestResult<Option<Payload>> + Send + Sync>;

/// An asynchronous handler function.
pub type AsyncFn = Arc<dyn Fn(Arguments) -> BoxFuture<'static, RestResult<Option<Payload>>> + Send + Sync>;

/// The function bound to a route.
#[derive(Clone)]
pub enum HandlerFn {
    /// Runs on the blocking worker pool.
    Blocking(BlockingFn),
    /// Returns a pending computation.
    Async(AsyncFn),
}

impl fmt::Debug for HandlerFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("Blocking"),
            Self::Async(_) => f.write_str("Async"),
        }
    }
}

/// A definition bound to its handler.
#[derive(Clone, Debug)]
pub struct Endpoint {
    definition: Arc<RouteDefinition>,
    handler: HandlerFn,
}

impl Endpoint {
    /// Route definition.
    #[must_use]
    pub const fn definition(&self) -> &Arc<RouteDefinition> {
        &self.definition
    }

    /// Handler function.
    #[must_use]
    pub const fn handler(&self) -> &HandlerFn {
        &self.handler
    }
}

/// Builder for [`RouteDefinition`].
#[derive(Debug)]
#[must_use]
pub struct RouteDefinitionBuilder {
    definition: RouteDefinition,
    errors: Vec<RestError>,
}

impl RouteDefinitionBuilder {
    fn new(method: Method, path: RoutePath) -> Self {
        Self {
            definition: RouteDefinition {
                method,
                path,
                consumes: Vec::new(),
                produces: Vec::new(),
                return_type: TypeDescriptor::anything(),
                parameters: Vec::new(),
                security: None,
                reader: None,
                writer: None,
                exception_handlers: Vec::new(),
                response_headers: Vec::new(),
                order: None,
                asynchronous: false,
                ordered: false,
                events: Vec::new(),
                check_compatibility: true,
            },
            errors: Vec::new(),
        }
    }

    fn media(&mut self, value: &str) -> Option<MediaType> {
        match MediaType::parse(value) {
            Ok(media) => Some(media),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Adds an accepted request media type.
    pub fn consumes(mut self, media: &str) -> Self {
        if let Some(media) = self.media(media) {
            self.definition.consumes.push(media);
        }
        self
    }

    /// Adds a produced response media type.
    pub fn produces(mut self, media: &str) -> Self {
        if let Some(media) = self.media(media) {
            self.definition.produces.push(media);
        }
        self
    }

    /// Declares the result type.
    pub fn returns<T: Typed>(mut self) -> Self {
        self.definition.return_type = T::descriptor();
        self
    }

    /// Declares the result type from a descriptor.
    pub fn returns_descriptor(mut self, descriptor: TypeDescriptor) -> Self {
        self.definition.return_type = descriptor;
        self
    }

    /// Appends a parameter.
    pub fn param(mut self, parameter: MethodParameter) -> Self {
        self.definition.parameters.push(parameter);
        self
    }

    /// Sets the security policy.
    pub fn security(mut self, policy: SecurityPolicy) -> Self {
        self.definition.security = Some(policy);
        self
    }

    /// Overrides the body reader.
    pub fn reader(mut self, reader: ReaderEntry) -> Self {
        self.definition.reader = Some(reader);
        self
    }

    /// Overrides the response writer.
    pub fn writer(mut self, writer: WriterEntry) -> Self {
        self.definition.writer = Some(writer);
        self
    }

    /// Adds a route-level exception handler, consulted before global ones.
    pub fn exception_handler(mut self, handler: HandlerEntry) -> Self {
        self.definition.exception_handlers.push(handler);
        self
    }

    /// Adds a header to every response of this route.
    pub fn response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.definition.response_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the router ordering hint.
    pub fn order(mut self, order: i32) -> Self {
        self.definition.order = Some(order);
        self
    }

    /// Delivers blocking responses in arrival order.
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.definition.ordered = ordered;
        self
    }

    /// Adds an event binding.
    pub fn event(mut self, binding: EventBinding) -> Self {
        self.definition.events.push(binding);
        self
    }

    /// Disables registration- and request-time codec type checks.
    pub fn skip_compatibility_check(mut self) -> Self {
        self.definition.check_compatibility = false;
        self
    }

    /// Finishes the definition without binding a handler.
    pub fn build(self) -> RestResult<RouteDefinition> {
        let Self { definition, mut errors } = self;
        if !errors.is_empty() {
            return Err(errors.remove(0));
        }
        let bodies = definition
            .parameters
            .iter()
            .filter(|p| p.source() == ParamSource::Body)
            .count();
        if bodies > 1 {
            return Err(RestError::illegal_argument(format!(
                "{definition} - only one body parameter may be declared"
            )));
        }
        if let RoutePath::Literal(path) = &definition.path {
            if !path.starts_with('/') {
                return Err(RestError::illegal_argument(format!(
                    "{definition} - path must start with '/'"
                )));
            }
        }
        Ok(definition)
    }

    /// Binds a blocking handler.
    pub fn blocking<F>(self, handler: F) -> RestResult<Endpoint>
    where
        F: Fn(Arguments) -> RestResult<Option<Payload>> + Send + Sync + 'static,
    {
        let mut definition = self.build()?;
        definition.asynchronous = false;
        Ok(Endpoint {
            definition: Arc::new(definition),
            handler: HandlerFn::Blocking(Arc::new(handler)),
        })
    }

    /// Binds a handler returning a pending computation.
    pub fn asynchronous<F, Fut>(self, handler: F) -> RestResult<Endpoint>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RestResult<Option<Payload>>> + Send + 'static,
    {
        let mut definition = self.build()?;
        definition.asynchronous = true;
        let handler: AsyncFn =
            Arc::new(move |args| -> BoxFuture<'static, RestResult<Option<Payload>>> {
                Box::pin(handler(args))
            });
        Ok(Endpoint {
            definition: Arc::new(definition),
            handler: HandlerFn::Async(handler),
        })
    }
}
