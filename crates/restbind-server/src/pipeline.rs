//! The dispatch pipeline: bind, validate, invoke, then produce the response.
//!
//! One stage serves both invocation strategies. Blocking handlers run, together
//! with argument binding and input validation, on the blocking worker pool;
//! routes flagged as ordered deliver their responses in arrival order. Async
//! handlers are bound inline and awaited. Response production is shared.

use std::fmt;
use std::sync::Arc;

use restbind_core::plugin::{Outcome, ResponseWriter};
use restbind_core::validation::{check_parameters, check_return_value};
use restbind_core::{
    Arguments, AsyncFn, BlockingFn, BoxFuture, Cause, Endpoint, HandlerFn, Payload, RestError, RestResult,
    RouteDefinition,
};
use restbind_extract::{ArgumentBinder, GenericResponseWriter};
use restbind_router::{Flow, RequestParts, RoutingContext, Stage};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::engine::Engine;
use crate::events::EventExecutor;

/// Final stage of a registered route.
pub struct DispatchStage {
    endpoint: Endpoint,
    engine: Arc<Engine>,
    events: EventExecutor,
    sequence: Option<Mutex<()>>,
}

impl DispatchStage {
    /// Stage invoking `endpoint` with plugins from `engine`.
    #[must_use]
    pub fn new(endpoint: Endpoint, engine: Arc<Engine>) -> Self {
        let ordered = matches!(endpoint.handler(), HandlerFn::Blocking(_)) && endpoint.definition().is_ordered();
        Self {
            endpoint,
            engine,
            events: EventExecutor,
            sequence: ordered.then(|| Mutex::new(())),
        }
    }

    /// The dispatched endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn dispatch_blocking(&self, handler: &BlockingFn, ctx: &mut RoutingContext) -> RestResult<Flow> {
        let _turn = match &self.sequence {
            Some(sequence) => Some(sequence.lock().await),
            None => None,
        };
        let definition = Arc::clone(self.endpoint.definition());
        let engine = Arc::clone(&self.engine);
        let handler = Arc::clone(handler);
        let mut parts = ctx.parts().clone();

        let (result, parts) = tokio::task::spawn_blocking(move || {
            let result = invoke_blocking(&engine, &definition, &handler, &mut parts);
            (result, parts)
        })
        .await
        .map_err(|e| RestError::invocation(Cause::message(format!("blocking handler did not complete: {e}"))))?;

        *ctx.parts_mut() = parts;
        let result = result?;
        self.respond(ctx, result.as_ref())?;
        Ok(Flow::Done)
    }

    async fn dispatch_async(&self, handler: &AsyncFn, ctx: &mut RoutingContext) -> RestResult<Flow> {
        let definition = self.endpoint.definition();
        let arguments = bind_and_check(&self.engine, definition, ctx.parts_mut())?;
        let result = handler(arguments).await?;
        self.respond(ctx, result.as_ref())?;
        Ok(Flow::Done)
    }

    fn respond(&self, ctx: &mut RoutingContext, result: Option<&Payload>) -> RestResult<()> {
        let definition = self.endpoint.definition();
        check_return_value(self.engine.validator().as_deref(), definition, result)?;
        let writer = resolve_writer(&self.engine, definition, ctx.parts(), result)?;
        produce_response(&self.engine, &self.events, ctx, definition, result, writer.as_ref())
    }
}

impl fmt::Debug for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchStage")
            .field("route", &self.endpoint.definition().to_string())
            .field("handler", self.endpoint.handler())
            .field("ordered", &self.sequence.is_some())
            .finish()
    }
}

impl Stage for DispatchStage {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        Box::pin(async move {
            trace!(route = %self.endpoint.definition(), "dispatching");
            match self.endpoint.handler() {
                HandlerFn::Blocking(handler) => self.dispatch_blocking(handler, ctx).await,
                HandlerFn::Async(handler) => self.dispatch_async(handler, ctx).await,
            }
        })
    }
}

fn bind_and_check(engine: &Engine, definition: &RouteDefinition, parts: &mut RequestParts) -> RestResult<Arguments> {
    let arguments = {
        let registry = engine.registry();
        let container = engine.container();
        ArgumentBinder::new(&registry, &container).bind(definition, parts)?
    };
    check_parameters(engine.validator().as_deref(), definition, &arguments)?;
    Ok(arguments)
}

fn invoke_blocking(
    engine: &Engine,
    definition: &RouteDefinition,
    handler: &BlockingFn,
    parts: &mut RequestParts,
) -> RestResult<Option<Payload>> {
    let arguments = bind_and_check(engine, definition, parts)?;
    handler(arguments)
}

/// Picks the writer for a result.
///
/// A route override wins. A null async result falls back to the generic
/// writer; otherwise the registry is asked for the result's runtime type (or
/// the declared return type for a null result) at the response media types.
/// Writers that cannot be built are replaced by the generic writer; only hard
/// type checks fail.
fn resolve_writer(
    engine: &Engine,
    definition: &RouteDefinition,
    parts: &RequestParts,
    result: Option<&Payload>,
) -> RestResult<Arc<dyn ResponseWriter>> {
    let container = engine.container();
    let returned = result.map_or_else(|| definition.return_type(), Payload::descriptor);

    let entry = if let Some(entry) = definition.writer() {
        if definition.check_compatibility() && result.is_some() && !entry.target().is_anything() {
            returned.check_assignable_to(
                entry.target(),
                format_args!("{definition} - result not writable by '{}'", entry.name()),
            )?;
        }
        Some(entry.clone())
    } else if definition.is_async() && result.is_none() {
        None
    } else {
        let media = parts.response_media();
        let resolved = engine.registry().writer_for(returned, &media);
        if resolved.is_none() {
            trace!(route = %definition, result = %returned, "no registered writer, using the generic writer");
        }
        resolved.map(|resolved| resolved.entry)
    };

    let Some(entry) = entry else {
        return Ok(Arc::new(GenericResponseWriter));
    };
    match entry.get(&container) {
        Ok(writer) => {
            debug!(route = %definition, writer = entry.name(), "response writer selected");
            Ok(writer)
        }
        Err(e @ RestError::PluginConstructionFailed { .. }) => {
            warn!(route = %definition, writer = entry.name(), error = %e, "writer unavailable, using the generic writer");
            Ok(Arc::new(GenericResponseWriter))
        }
        Err(e) => Err(e),
    }
}

/// Writes `result` with `writer` and runs the success events.
///
/// Synchronous routes are ended here if the writer left the response open.
pub(crate) fn produce_response(
    engine: &Engine,
    events: &EventExecutor,
    ctx: &mut RoutingContext,
    definition: &RouteDefinition,
    result: Option<&Payload>,
    writer: &dyn ResponseWriter,
) -> RestResult<()> {
    let container = engine.container();
    let (request, response) = ctx.split();
    writer.add_response_headers(Some(definition), response)?;
    writer.write(result, request, response)?;
    events.trigger(
        Some(definition),
        result.map(Outcome::Success),
        response.status(),
        request,
        &container,
    );
    if !definition.is_async() && !response.is_ended() {
        response.end()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use restbind_core::plugin::WriterEntry;
    use restbind_extract::Registry;
    use restbind_core::{typed, HttpRequest, HttpResponse, MethodParameter, TypeDescriptor, Validator, Violation};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Widget {
        id: u32,
    }
    typed!(Widget);

    struct WidgetWriter;

    impl ResponseWriter for WidgetWriter {
        fn write(&self, result: Option<&Payload>, _request: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
            let id = result.and_then(|p| p.downcast_ref::<Widget>()).map_or(0, |w| w.id);
            response.end_with(format!("widget #{id}"))
        }
    }

    struct PositiveIds;

    impl Validator for PositiveIds {
        fn validate_parameters(&self, _definition: &RouteDefinition, arguments: &Arguments) -> Vec<Violation> {
            match arguments.get::<i64>("id") {
                Some(id) if *id <= 0 => vec![Violation::new("id", "must be positive")],
                _ => Vec::new(),
            }
        }

        fn validate_return_value(&self, _definition: &RouteDefinition, _result: Option<&Payload>) -> Vec<Violation> {
            Vec::new()
        }
    }

    fn context(definition: &Arc<RouteDefinition>, target: &str) -> RoutingContext {
        let mut ctx = RoutingContext::new(HttpRequest::build(Method::GET, target).unwrap());
        ctx.set_definition(Some(Arc::clone(definition)));
        ctx
    }

    #[tokio::test]
    async fn test_blocking_handler_gets_bound_arguments() {
        let endpoint = RouteDefinition::get("/echo")
            .param(MethodParameter::query::<i64>("id"))
            .returns::<String>()
            .blocking(|args| Ok(Payload::some(format!("id={}", args.required::<i64>("id")?))))
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), Arc::new(Engine::default()));
        let mut ctx = context(endpoint.definition(), "/echo?id=42");

        assert_eq!(stage.handle(&mut ctx).await.unwrap(), Flow::Done);
        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"id=42");
    }

    #[tokio::test]
    async fn test_input_validation_runs_before_invocation() {
        let engine = Arc::new(Engine::default());
        engine.set_validator(Arc::new(PositiveIds));
        let endpoint = RouteDefinition::get("/echo")
            .param(MethodParameter::query::<i64>("id"))
            .blocking(|_| panic!("handler must not run"))
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), engine);
        let mut ctx = context(endpoint.definition(), "/echo?id=-1");

        let err = stage.handle(&mut ctx).await.unwrap_err();
        assert!(matches!(err, RestError::ValidationFailed { .. }));
        assert!(!ctx.response().is_ended());
    }

    #[tokio::test]
    async fn test_registered_writer_for_runtime_type() {
        let engine = Arc::new(Engine::default());
        engine
            .registry_mut()
            .add_writer(WriterEntry::of::<Widget, _>(WidgetWriter))
            .unwrap();
        let endpoint = RouteDefinition::get("/w")
            .returns::<Widget>()
            .asynchronous(|_| async { Ok(Payload::some(Widget { id: 9 })) })
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), engine);
        let mut ctx = context(endpoint.definition(), "/w");

        stage.handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().body(), b"widget #9");
    }

    #[tokio::test]
    async fn test_async_null_result_uses_generic_writer() {
        let engine = Arc::new(Engine::default());
        engine
            .registry_mut()
            .add_writer(WriterEntry::of::<Widget, _>(WidgetWriter))
            .unwrap();
        let endpoint = RouteDefinition::get("/w")
            .returns::<Widget>()
            .asynchronous(|_| async { Ok(None) })
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), engine);
        let mut ctx = context(endpoint.definition(), "/w");

        stage.handle(&mut ctx).await.unwrap();
        assert!(ctx.response().is_ended());
        assert!(ctx.response().body().is_empty());
        assert_eq!(ctx.response().status(), StatusCode::OK);
    }

    fn unbuildable_writer() -> WriterEntry {
        WriterEntry::from_factory(TypeDescriptor::of::<String>(), "Unbuildable", |_| {
            Err(RestError::plugin_construction("Unbuildable", "no container entry"))
        })
    }

    #[tokio::test]
    async fn test_unbuildable_route_writer_falls_back_to_generic() {
        let endpoint = RouteDefinition::get("/w")
            .returns::<String>()
            .writer(unbuildable_writer())
            .blocking(|_| Ok(Payload::some("plain".to_string())))
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), Arc::new(Engine::default()));
        let mut ctx = context(endpoint.definition(), "/w");

        assert_eq!(stage.handle(&mut ctx).await.unwrap(), Flow::Done);
        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"plain");
    }

    #[tokio::test]
    async fn test_unbuildable_registered_writer_falls_back_to_generic() {
        let engine = Arc::new(Engine::new(Registry::new()));
        engine.registry_mut().add_writer(unbuildable_writer()).unwrap();
        let endpoint = RouteDefinition::get("/w")
            .returns::<String>()
            .asynchronous(|_| async { Ok(Payload::some("plain".to_string())) })
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), engine);
        let mut ctx = context(endpoint.definition(), "/w");

        stage.handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().body(), b"plain");
    }

    #[tokio::test]
    async fn test_writer_override_type_mismatch_is_hard() {
        let endpoint = RouteDefinition::get("/w")
            .returns::<String>()
            .writer(WriterEntry::of::<Widget, _>(WidgetWriter))
            .blocking(|_| Ok(Payload::some("text".to_string())))
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), Arc::new(Engine::default()));
        let mut ctx = context(endpoint.definition(), "/w");

        let err = stage.handle(&mut ctx).await.unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[tokio::test]
    async fn test_handler_failure_propagates() {
        let endpoint = RouteDefinition::get("/w")
            .blocking(|_| Err(RestError::status(StatusCode::CONFLICT, "taken")))
            .unwrap();
        let stage = DispatchStage::new(endpoint.clone(), Arc::new(Engine::default()));
        let mut ctx = context(endpoint.definition(), "/w");

        match stage.handle(&mut ctx).await.unwrap_err() {
            RestError::Execution { status, .. } => assert_eq!(status, StatusCode::CONFLICT),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_only_blocking_routes_are_sequenced() {
        let ordered = RouteDefinition::get("/o").ordered(true).blocking(|_| Ok(None)).unwrap();
        assert!(DispatchStage::new(ordered, Arc::new(Engine::default())).sequence.is_some());

        let ordered_async = RouteDefinition::get("/a")
            .ordered(true)
            .asynchronous(|_| async { Ok(None) })
            .unwrap();
        assert!(DispatchStage::new(ordered_async, Arc::new(Engine::default())).sequence.is_none());
    }
}
