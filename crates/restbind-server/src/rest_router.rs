//! Route registration.
//!
//! [`RestRouter`] turns [`Endpoint`]s into router stage chains and owns the
//! plugin registry, injection container and validator shared by them.
//!
//! ```rust
//! use http::Method;
//! use restbind_core::{HttpRequest, MethodParameter, Payload, RouteDefinition};
//! use restbind_server::RestRouter;
//!
//! let mut rest = RestRouter::new();
//! rest.register(
//!     RouteDefinition::get("/hello/:name")
//!         .param(MethodParameter::path::<String>("name"))
//!         .returns::<String>()
//!         .blocking(|args| Ok(Payload::some(format!("hello {}", args.required::<String>("name")?))))
//!         .unwrap(),
//! )
//! .unwrap();
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let response = rest.handle(HttpRequest::build(Method::GET, "/hello/ada").unwrap()).await;
//! assert_eq!(response.body(), b"hello ada");
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use restbind_core::plugin::{HandlerEntry, ProviderEntry, ReaderEntry, WriterEntry};
use restbind_core::{Container, Endpoint, HttpRequest, HttpResponse, RestError, RestResult, RouteDefinition, Validator};
use restbind_extract::{ArgumentBinder, NotFoundResponseWriter, Registry, RegistryState};
use restbind_middleware::{
    BodyStage, ContextProviderStage, CookieStage, CorsStage, SecurityStage, ORDER_CORS_HANDLER,
    ORDER_PROVIDER_HANDLER,
};
use restbind_router::{Route, Router, Stage};
use tracing::{debug, info};

use crate::engine::Engine;
use crate::not_found::NotFoundStage;
use crate::pipeline::DispatchStage;
use crate::translator::ErrorTranslator;

/// Registration front end over a [`Router`].
pub struct RestRouter {
    router: Router,
    engine: Arc<Engine>,
    body_limit: Option<usize>,
}

impl Default for RestRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RestRouter {
    /// A router with the built-in readers and writers registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Registry::with_defaults())
    }

    /// A router resolving plugins from `registry`.
    #[must_use]
    pub fn with_registry(registry: Registry) -> Self {
        let engine = Arc::new(Engine::new(registry));
        let mut router = Router::new();
        router.set_failure_handler(Arc::new(ErrorTranslator::new(Arc::clone(&engine))));
        Self {
            router,
            engine,
            body_limit: None,
        }
    }

    /// Limits request bodies of routes registered from now on.
    pub fn set_body_limit(&mut self, limit: usize) -> &mut Self {
        self.body_limit = Some(limit);
        self
    }

    /// Registers `endpoint`.
    ///
    /// Stages are attached in this order: media filters and order hint (from
    /// the definition), body, cookie, security, dispatch.
    ///
    /// # Errors
    ///
    /// [`RestError::TypeMismatch`] when the body parameter cannot be read by
    /// the reader it would get, or the return type cannot be written by the
    /// route's writer; path errors from the router.
    pub fn register(&mut self, endpoint: Endpoint) -> RestResult<&mut Self> {
        let definition = Arc::clone(endpoint.definition());
        self.check_body_reader(&definition)?;
        self.check_writer(&definition)?;

        let mut route = Route::for_definition(Arc::clone(&definition))?;
        if definition.request_has_body() {
            let body = self.body_limit.map_or_else(BodyStage::new, BodyStage::with_limit);
            route = route.stage(Arc::new(body));
        }
        if definition.has_cookies() {
            route = route.stage(Arc::new(CookieStage));
        }
        if let Some(policy) = definition.security() {
            route = route.stage(Arc::new(SecurityStage::new(policy.clone())));
        }
        route = route.stage(Arc::new(DispatchStage::new(endpoint, Arc::clone(&self.engine))));

        info!(route = %definition, stages = ?route.stage_names(), "registering route");
        self.router.route(route);
        Ok(self)
    }

    /// Registers every endpoint, stopping at the first failure.
    pub fn register_all<I>(&mut self, endpoints: I) -> RestResult<&mut Self>
    where
        I: IntoIterator<Item = Endpoint>,
    {
        for endpoint in endpoints {
            self.register(endpoint)?;
        }
        Ok(self)
    }

    /// Attaches a pre-built stage as a catch-all route.
    pub fn register_stage(&mut self, stage: Arc<dyn Stage>) -> &mut Self {
        info!(stage = stage.name(), "registering handler");
        self.router.route(Route::any().stage(stage));
        self
    }

    /// Runs `provider` on every request before any registered route.
    ///
    /// The provider is constructed now.
    pub fn provide(&mut self, provider: ProviderEntry) -> RestResult<&mut Self> {
        let instance = provider
            .get(&self.engine.container())
            .map_err(|e| RestError::illegal_argument(e.to_string()))?;
        info!(provider = provider.name(), "registering context provider");
        self.router.route(
            Route::any()
                .order(ORDER_PROVIDER_HANDLER)
                .stage(Arc::new(ContextProviderStage::new(instance, provider.name()))),
        );
        Ok(self)
    }

    /// Answers every unhandled request through `writer`.
    pub fn not_found(&mut self, writer: WriterEntry) -> &mut Self {
        self.router
            .route(Route::any().last().stage(Arc::new(NotFoundStage::new(writer, Arc::clone(&self.engine)))));
        self
    }

    /// Answers unhandled requests whose path matches `pattern` through `writer`.
    pub fn not_found_at(&mut self, pattern: &str, writer: WriterEntry) -> RestResult<&mut Self> {
        let stage = NotFoundStage::new(writer, Arc::clone(&self.engine));
        self.router.route(Route::regex(pattern)?.last().stage(Arc::new(stage)));
        Ok(self)
    }

    /// Answers every unhandled request with a plain 404.
    pub fn not_found_default(&mut self) -> &mut Self {
        self.not_found(WriterEntry::of::<restbind_core::Anything, _>(NotFoundResponseWriter::default()))
    }

    /// Installs a CORS policy ahead of every other route.
    pub fn enable_cors(&mut self, cors: CorsStage) -> &mut Self {
        info!("enabling CORS");
        self.router
            .route(Route::any().order(ORDER_CORS_HANDLER).stage(Arc::new(cors)));
        self
    }

    /// Constructs plugins through `container` from now on.
    pub fn inject_with(&mut self, container: Container) -> &mut Self {
        self.engine.set_container(container);
        self
    }

    /// Validates arguments and results through `validator`.
    pub fn validate_with(&mut self, validator: Arc<dyn Validator>) -> &mut Self {
        self.engine.set_validator(validator);
        self
    }

    /// Registers a body reader.
    pub fn add_reader(&mut self, entry: ReaderEntry) -> RestResult<&mut Self> {
        self.engine.registry_mut().add_reader(entry)?;
        Ok(self)
    }

    /// Registers a response writer.
    pub fn add_writer(&mut self, entry: WriterEntry) -> RestResult<&mut Self> {
        self.engine.registry_mut().add_writer(entry)?;
        Ok(self)
    }

    /// Registers an exception handler.
    pub fn add_exception_handler(&mut self, entry: HandlerEntry) -> RestResult<&mut Self> {
        self.engine.registry_mut().add_exception_handler(entry)?;
        Ok(self)
    }

    /// Registers a context provider used for context parameters nothing provided.
    pub fn add_provider(&mut self, entry: ProviderEntry) -> RestResult<&mut Self> {
        self.engine.registry_mut().add_provider(entry)?;
        Ok(self)
    }

    /// Removes every registered plugin. Only allowed before serving.
    pub fn clear_plugins(&mut self) -> RestResult<()> {
        self.engine.registry_mut().clear()
    }

    /// Stops plugin registration; called when serving starts.
    pub fn freeze(&mut self) {
        self.engine.registry_mut().freeze();
    }

    /// Lifecycle state of the plugin registry.
    pub fn registry_state(&self) -> RegistryState {
        self.engine.registry().state()
    }

    /// Shared engine state.
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// The underlying router.
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Routes one request and returns the ended response.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        self.router.handle(request).await
    }

    fn check_body_reader(&self, definition: &RouteDefinition) -> RestResult<()> {
        if !definition.request_has_body() {
            return Ok(());
        }
        let Some(parameter) = definition.body_parameter() else {
            return Ok(());
        };
        let registry = self.engine.registry();
        let container = self.engine.container();
        match ArgumentBinder::new(&registry, &container).body_reader(definition, parameter, definition.consumes()) {
            Ok(_) => Ok(()),
            Err(e) if e.is_type_mismatch() => Err(e),
            Err(e) => {
                debug!(route = %definition, error = %e, "body reader not available at registration");
                Ok(())
            }
        }
    }

    fn check_writer(&self, definition: &RouteDefinition) -> RestResult<()> {
        if definition.is_async() || !definition.check_compatibility() {
            return Ok(());
        }
        let Some(writer) = definition.writer() else {
            return Ok(());
        };
        let returned = definition.return_type();
        if returned.is_anything() || writer.target().is_anything() {
            return Ok(());
        }
        returned.check_assignable_to(
            writer.target(),
            format_args!("{definition} - response type not writable by '{}'", writer.name()),
        )
    }
}

impl fmt::Debug for RestRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestRouter")
            .field("routes", &self.router.len())
            .field("engine", &self.engine)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use restbind_core::{typed, MethodParameter, Payload, SecurityPolicy};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Widget {
        name: String,
    }
    typed!(Widget);

    #[derive(Debug, Serialize, Deserialize)]
    struct Gadget;
    typed!(Gadget);

    #[test]
    fn test_stages_follow_registration_order() {
        let mut rest = RestRouter::new();
        rest.register(
            RouteDefinition::post("/w")
                .consumes("application/json")
                .param(MethodParameter::body::<Widget>())
                .param(MethodParameter::cookie::<String>("session"))
                .security(SecurityPolicy::roles(["admin"]))
                .blocking(|_| Ok(None))
                .unwrap(),
        )
        .unwrap();

        let route = rest.router().routes().next().unwrap();
        assert_eq!(route.stage_names(), vec!["body", "cookie", "security", "dispatch"]);
    }

    #[test]
    fn test_get_routes_skip_body_stage() {
        let mut rest = RestRouter::new();
        rest.register(RouteDefinition::get("/w").blocking(|_| Ok(None)).unwrap())
            .unwrap();
        let route = rest.router().routes().next().unwrap();
        assert_eq!(route.stage_names(), vec!["dispatch"]);
    }

    #[test]
    fn test_incompatible_body_reader_fails_registration() {
        let mut registry = Registry::new();
        registry
            .add_reader(
                ReaderEntry::of::<Widget, _>(restbind_extract::TypedJsonReader::<Widget>::default())
                    .with_media(restbind_core::MediaType::json()),
            )
            .unwrap();
        let mut rest = RestRouter::with_registry(registry);
        let err = rest
            .register(
                RouteDefinition::post("/g")
                    .consumes("application/json")
                    .param(MethodParameter::body::<Gadget>())
                    .blocking(|_| Ok(None))
                    .unwrap(),
            )
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert!(rest.router().is_empty());
    }

    #[test]
    fn test_incompatible_writer_override_fails_registration() {
        let mut rest = RestRouter::new();
        let err = rest
            .register(
                RouteDefinition::get("/g")
                    .returns::<Gadget>()
                    .writer(WriterEntry::of::<Widget, _>(restbind_extract::JsonResponseWriter))
                    .blocking(|_| Ok(None))
                    .unwrap(),
            )
            .unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_frozen_registry_rejects_plugins() {
        let mut rest = RestRouter::new();
        rest.freeze();
        assert_eq!(rest.registry_state(), RegistryState::Serving);
        assert!(rest.add_writer(restbind_extract::JsonResponseWriter::entry()).is_err());
        assert!(rest.clear_plugins().is_err());
    }

    #[tokio::test]
    async fn test_not_found_is_independent_per_request() {
        let mut rest = RestRouter::new();
        rest.not_found_default();
        for _ in 0..2 {
            let response = rest.handle(HttpRequest::build(Method::GET, "/nowhere").unwrap()).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(response.body(), b"Not Found");
        }
    }
}
