//! Ordered route table.
//!
//! Routes are tried in ascending order: explicit order hints first, then
//! registration order, with "last" routes after everything else. Every route
//! whose method, path and media types match runs its stages; a stage returning
//! [`Flow::Next`] after the route's final stage falls through to the next
//! matching route. Falling off the end of the table produces `404 Not Found`,
//! or `415`/`406` when a route only failed on media types.

use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use restbind_core::{HttpRequest, HttpResponse, MediaType, RestResult, RouteDefinition};
use tracing::{debug, trace, warn};

use crate::context::RoutingContext;
use crate::path::PathMatcher;
use crate::stage::{FailureHandler, Flow, PlainFailureHandler, Stage};

/// A route: match criteria plus the stages to run.
#[derive(Clone)]
#[must_use]
pub struct Route {
    methods: Vec<Method>,
    matcher: PathMatcher,
    order: Option<i32>,
    last: bool,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
    stages: Vec<Arc<dyn Stage>>,
    definition: Option<Arc<RouteDefinition>>,
}

impl Route {
    fn with_matcher(matcher: PathMatcher) -> Self {
        Self {
            methods: Vec::new(),
            matcher,
            order: None,
            last: false,
            consumes: Vec::new(),
            produces: Vec::new(),
            stages: Vec::new(),
            definition: None,
        }
    }

    /// A route matching every request.
    pub fn any() -> Self {
        Self::with_matcher(PathMatcher::Any)
    }

    /// A route for a literal path template.
    pub fn path(path: &str) -> RestResult<Self> {
        PathMatcher::template(path).map(Self::with_matcher)
    }

    /// A route for a regular-expression path.
    pub fn regex(pattern: &str) -> RestResult<Self> {
        PathMatcher::regex(pattern).map(Self::with_matcher)
    }

    /// A route carrying a definition's method, path, media types and order.
    pub fn for_definition(definition: Arc<RouteDefinition>) -> RestResult<Self> {
        let mut route = Self::with_matcher(PathMatcher::from_route_path(definition.path())?);
        route.methods.push(definition.method().clone());
        route.consumes = definition.consumes().to_vec();
        route.produces = definition.produces().to_vec();
        route.order = definition.order();
        route.definition = Some(definition);
        Ok(route)
    }

    /// Restricts the route to `method`. May be called repeatedly.
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Sets the ordering hint.
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Runs this route after all others.
    pub fn last(mut self) -> Self {
        self.last = true;
        self
    }

    /// Appends a stage.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Definition attached to this route.
    #[must_use]
    pub fn definition(&self) -> Option<&Arc<RouteDefinition>> {
        self.definition.as_ref()
    }

    /// Names of the attached stages, in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    fn accepts_method(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("matcher", &self.matcher)
            .field("order", &self.order)
            .field("last", &self.last)
            .field("stages", &self.stage_names())
            .finish()
    }
}

struct Slot {
    order: i32,
    seq: usize,
    route: Route,
}

/// Media type to respond with: the first route-produced type acceptable to the client.
fn negotiate(produces: &[MediaType], accepted: &[MediaType]) -> Option<MediaType> {
    accepted.iter().find_map(|wanted| {
        produces
            .iter()
            .find(|offered| offered.matches(wanted))
            .map(|offered| if offered.is_wildcard() { wanted.clone() } else { offered.clone() })
    })
}

/// The ordered route table.
pub struct Router {
    slots: Vec<Slot>,
    next_seq: usize,
    failure: Arc<dyn FailureHandler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// An empty router with [`PlainFailureHandler`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_seq: 0,
            failure: Arc::new(PlainFailureHandler),
        }
    }

    /// Adds a route. Without an order hint its order is its registration index.
    pub fn route(&mut self, route: Route) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let order = route
            .order
            .unwrap_or_else(|| i32::try_from(seq).unwrap_or(i32::MAX));
        debug!(
            methods = ?route.methods,
            matcher = ?route.matcher,
            order,
            last = route.last,
            stages = ?route.stage_names(),
            "route added"
        );
        self.slots.push(Slot { order, seq, route });
        self.slots
            .sort_by_key(|slot| (slot.route.last, slot.order, slot.seq));
    }

    /// Replaces the handler receiving stage errors.
    pub fn set_failure_handler(&mut self, handler: Arc<dyn FailureHandler>) {
        self.failure = handler;
    }

    /// Removes every route.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.next_seq = 0;
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Routes in execution order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.slots.iter().map(|slot| &slot.route)
    }

    /// Routes `request` through the table and returns the ended response.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let mut ctx = RoutingContext::new(request);
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_string();
        let mut mismatch: Option<StatusCode> = None;

        for slot in &self.slots {
            let route = &slot.route;
            if !route.accepts_method(&method) {
                continue;
            }
            let Some(matched) = route.matcher.matches(&path) else {
                continue;
            };
            if !route.consumes.is_empty() {
                if let Some(content_type) = ctx.request().content_type() {
                    if !route.consumes.iter().any(|c| c.matches(&content_type)) {
                        mismatch = Some(StatusCode::UNSUPPORTED_MEDIA_TYPE);
                        continue;
                    }
                }
            }
            let acceptable = if route.produces.is_empty() {
                None
            } else {
                match negotiate(&route.produces, &ctx.request().accept()) {
                    Some(media) => Some(media),
                    None => {
                        mismatch.get_or_insert(StatusCode::NOT_ACCEPTABLE);
                        continue;
                    }
                }
            };

            trace!(%method, %path, order = slot.order, "route matched");
            let parts = ctx.parts_mut();
            parts.params = matched.params;
            parts.matrix = matched.matrix;
            parts.acceptable = acceptable;
            ctx.set_definition(route.definition.clone());

            for stage in &route.stages {
                match stage.handle(&mut ctx).await {
                    Ok(Flow::Next) => {}
                    Ok(Flow::Done) => return Self::finish(ctx),
                    Err(error) => {
                        debug!(stage = stage.name(), error = %error, "stage failed");
                        self.failure.handle_failure(error, &mut ctx).await;
                        return Self::finish(ctx);
                    }
                }
            }
            if ctx.response().is_ended() {
                return ctx.into_response();
            }
        }

        if !ctx.response().is_ended() {
            let status = mismatch.unwrap_or(StatusCode::NOT_FOUND);
            let response = ctx.response_mut();
            response.set_status(status);
            if let Err(e) = response.end_with(status.canonical_reason().unwrap_or_default()) {
                warn!(error = %e, "failed to end unrouted response");
            }
        }
        ctx.into_response()
    }

    fn finish(mut ctx: RoutingContext) -> HttpResponse {
        if !ctx.response().is_ended() {
            trace!(path = ctx.request().path(), "ending response left open by its handler");
            if let Err(e) = ctx.response_mut().end() {
                warn!(error = %e, "failed to end response");
            }
        }
        ctx.into_response()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.slots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::FnStage;
    use restbind_core::RestError;

    fn reply(body: &'static str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new("reply", move |ctx: &mut RoutingContext| {
            ctx.response_mut().end_with(body)?;
            Ok(Flow::Done)
        }))
    }

    fn mark(header: &'static str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new("mark", move |ctx: &mut RoutingContext| {
            ctx.response_mut().append_header("x-seen", header)?;
            Ok(Flow::Next)
        }))
    }

    fn get(path: &str) -> HttpRequest {
        HttpRequest::build(Method::GET, path).unwrap()
    }

    #[tokio::test]
    async fn test_order_hint_runs_first() {
        let mut router = Router::new();
        router.route(Route::path("/a").unwrap().stage(reply("late")));
        router.route(Route::any().order(-10).stage(mark("cors")));
        let response = router.handle(get("/a")).await;
        assert_eq!(response.body(), b"late");
        assert_eq!(response.header("x-seen"), Some("cors"));
    }

    #[tokio::test]
    async fn test_last_route_runs_after_everything() {
        let mut router = Router::new();
        router.route(Route::any().last().stage(reply("fallback")));
        router.route(Route::path("/known").unwrap().stage(reply("known")));
        assert_eq!(router.handle(get("/known")).await.body(), b"known");
        assert_eq!(router.handle(get("/other")).await.body(), b"fallback");
    }

    #[tokio::test]
    async fn test_unmatched_is_not_found() {
        let router = Router::new();
        let response = router.handle(get("/nothing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.is_ended());
    }

    #[tokio::test]
    async fn test_method_filter() {
        let mut router = Router::new();
        router.route(Route::path("/w").unwrap().method(Method::POST).stage(reply("posted")));
        let response = router.handle(get("/w")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_produces_mismatch_is_not_acceptable() {
        let mut router = Router::new();
        let definition = Arc::new(
            RouteDefinition::get("/w")
                .produces("application/json")
                .build()
                .unwrap(),
        );
        router.route(Route::for_definition(definition).unwrap().stage(reply("{}")));
        let request = get("/w").with_header("accept", "text/html").unwrap();
        assert_eq!(router.handle(request).await.status(), StatusCode::NOT_ACCEPTABLE);

        let request = get("/w").with_header("accept", "application/json").unwrap();
        assert_eq!(router.handle(request).await.body(), b"{}");
    }

    #[tokio::test]
    async fn test_consumes_mismatch_is_unsupported() {
        let mut router = Router::new();
        let definition = Arc::new(
            RouteDefinition::post("/w")
                .consumes("application/json")
                .build()
                .unwrap(),
        );
        router.route(Route::for_definition(definition).unwrap().stage(reply("ok")));
        let request = HttpRequest::build(Method::POST, "/w")
            .unwrap()
            .with_header("content-type", "text/plain")
            .unwrap();
        assert_eq!(
            router.handle(request).await.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[tokio::test]
    async fn test_stage_error_goes_to_failure_handler() {
        let mut router = Router::new();
        router.route(Route::path("/boom").unwrap().stage(Arc::new(FnStage::new(
            "boom",
            |_: &mut RoutingContext| Err(RestError::Unauthorized),
        ))));
        let response = router.handle(get("/boom")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.body(), b"HTTP 401 Unauthorized");
    }

    #[tokio::test]
    async fn test_done_without_end_is_terminated() {
        let mut router = Router::new();
        router.route(Route::path("/open").unwrap().stage(Arc::new(FnStage::new(
            "open",
            |ctx: &mut RoutingContext| {
                ctx.response_mut().write("partial")?;
                Ok(Flow::Done)
            },
        ))));
        let response = router.handle(get("/open")).await;
        assert!(response.is_ended());
        assert_eq!(response.body(), b"partial");
    }

    #[tokio::test]
    async fn test_path_params_reach_stages() {
        let mut router = Router::new();
        router.route(Route::path("/users/:id").unwrap().stage(Arc::new(FnStage::new(
            "echo",
            |ctx: &mut RoutingContext| {
                let id = ctx.parts().params.get("id").unwrap_or_default().to_string();
                ctx.response_mut().end_with(id)?;
                Ok(Flow::Done)
            },
        ))));
        assert_eq!(router.handle(get("/users/17")).await.body(), b"17");
    }

    #[test]
    fn test_negotiate_prefers_client_order() {
        let produces = [MediaType::json(), MediaType::text()];
        let accepted = [MediaType::text(), MediaType::json()];
        assert_eq!(negotiate(&produces, &accepted), Some(MediaType::text()));
        assert_eq!(
            negotiate(&produces, &[MediaType::wildcard()]),
            Some(MediaType::json())
        );
        assert_eq!(negotiate(&produces, &[MediaType::html()]), None);
    }
}
