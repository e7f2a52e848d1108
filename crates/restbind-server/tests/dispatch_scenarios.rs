//! End-to-end dispatch tests.
//!
//! Each test registers endpoints on a [`RestRouter`] and drives requests
//! through the whole stage chain in memory: routing, body reading, security,
//! argument binding, invocation, writer resolution, error translation and
//! lifecycle events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Method, StatusCode};
use restbind_core::plugin::{ContextProvider, EventEntry, Outcome, ProviderEntry, ReaderEntry, RestEvent, WriterEntry};
use restbind_core::{
    typed, AnyFailure, Anything, ContextValue, CurrentUser, EventBinding, EventTrigger, HttpRequest, MediaType,
    MethodParameter, Payload, RestError, RestResult, RoleUser, RouteDefinition, SecurityPolicy, TypeDescriptor,
};
use restbind_extract::{JsonResponseWriter, Registry};
use restbind_middleware::CorsStage;
use restbind_server::RestRouter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Widget {
    name: String,
}
typed!(Widget);

/// Records which events fired and what they saw.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn seen(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl RestEvent for Recorder {
    fn execute(&self, outcome: Outcome<'_>, status: StatusCode, _request: &HttpRequest) -> RestResult<()> {
        let label = match outcome {
            Outcome::Success(payload) => format!("success {} {}", status.as_u16(), payload.descriptor().tag().short_name()),
            Outcome::Failure(cause) => match cause.as_rest_error() {
                Some(error) => format!("failure {} {:?}", status.as_u16(), error.kind()),
                None => format!("failure {} {}", status.as_u16(), cause.message_text()),
            },
        };
        self.0.lock().unwrap().push(label);
        Ok(())
    }
}

/// Installs a user named by the `x-user` header holding the `x-roles` roles.
struct HeaderUser;

impl ContextProvider for HeaderUser {
    fn provide(&self, request: &HttpRequest) -> RestResult<Option<ContextValue>> {
        let Some(name) = request.header("x-user") else {
            return Ok(None);
        };
        let roles = request
            .header("x-roles")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        Ok(Some(ContextValue::user(RoleUser::new(name, roles))))
    }
}

fn get(target: &str) -> HttpRequest {
    HttpRequest::build(Method::GET, target).unwrap()
}

fn body_text(response: &restbind_core::HttpResponse) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}

// ============================================================================
// Writer Resolution
// ============================================================================

#[tokio::test]
async fn test_registered_writer_serializes_matching_result() {
    let mut registry = Registry::new();
    registry
        .add_writer(WriterEntry::of::<Widget, _>(JsonResponseWriter).with_media(MediaType::json()))
        .unwrap();
    let recorder = Recorder::default();

    let mut rest = RestRouter::with_registry(registry);
    rest.register(
        RouteDefinition::get("/widget")
            .returns::<Widget>()
            .event(EventBinding::new(
                EventTrigger::OnDefaultSuccess,
                EventEntry::of::<Anything, _>(recorder.clone()),
            ))
            .event(EventBinding::new(
                EventTrigger::OnDefaultFailure,
                EventEntry::of::<AnyFailure, _>(recorder.clone()),
            ))
            .blocking(|_| Ok(Payload::some(Widget { name: "gear".into() })))
            .unwrap(),
    )
    .unwrap();

    let request = get("/widget").with_header("accept", "application/json").unwrap();
    let response = rest.handle(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(body_text(&response), r#"{"name":"gear"}"#);
    assert_eq!(recorder.seen(), vec!["success 200 Widget".to_string()]);
}

/// A writer whose backend is down.
struct DownWriter;

impl restbind_core::plugin::ResponseWriter for DownWriter {
    fn write(
        &self,
        _result: Option<&Payload>,
        _request: &HttpRequest,
        _response: &mut restbind_core::HttpResponse,
    ) -> RestResult<()> {
        Err(RestError::status(StatusCode::SERVICE_UNAVAILABLE, "renderer down"))
    }
}

#[tokio::test]
async fn test_failed_write_runs_only_failure_events() {
    let recorder = Recorder::default();
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/widget")
            .returns::<Widget>()
            .writer(WriterEntry::of::<Widget, _>(DownWriter))
            .event(EventBinding::new(
                EventTrigger::OnDefaultSuccess,
                EventEntry::of::<Anything, _>(recorder.clone()),
            ))
            .event(EventBinding::new(
                EventTrigger::OnDefaultFailure,
                EventEntry::of::<AnyFailure, _>(recorder.clone()),
            ))
            .blocking(|_| Ok(Payload::some(Widget { name: "gear".into() })))
            .unwrap(),
    )
    .unwrap();

    let response = rest.handle(get("/widget")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let seen = recorder.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("failure 503"), "unexpected events: {seen:?}");
}

#[tokio::test]
async fn test_async_empty_result_uses_generic_writer() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/later")
            .returns::<Widget>()
            .asynchronous(|_| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(None)
            })
            .unwrap(),
    )
    .unwrap();

    let response = rest.handle(get("/later")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.is_ended());
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn test_json_body_is_bound_and_answered() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::post("/widgets")
            .consumes("application/json")
            .produces("application/json")
            .param(MethodParameter::body::<Widget>())
            .returns::<Widget>()
            .blocking(|mut args| {
                let widget = args.body::<Widget>()?;
                Ok(Payload::some(Widget {
                    name: widget.name.to_uppercase(),
                }))
            })
            .unwrap(),
    )
    .unwrap();

    let request = HttpRequest::build(Method::POST, "/widgets")
        .unwrap()
        .with_header("content-type", "application/json")
        .unwrap()
        .with_header("accept", "application/json")
        .unwrap()
        .with_body(r#"{"name":"gear"}"#);
    let response = rest.handle(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Widget = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(echoed, Widget { name: "GEAR".into() });
}

#[tokio::test]
async fn test_unbuildable_reader_reads_body_as_text() {
    let mut rest = RestRouter::with_registry(Registry::new());
    rest.add_reader(
        ReaderEntry::from_factory(TypeDescriptor::of::<String>(), "Unbuildable", |_| {
            Err(RestError::plugin_construction("Unbuildable", "no container entry"))
        })
        .with_media(MediaType::text()),
    )
    .unwrap();
    rest.register(
        RouteDefinition::post("/notes")
            .param(MethodParameter::body::<String>())
            .returns::<String>()
            .blocking(|args| Ok(Payload::some(format!("got {}", args.required::<String>("body")?))))
            .unwrap(),
    )
    .unwrap();

    let request = HttpRequest::build(Method::POST, "/notes")
        .unwrap()
        .with_header("content-type", "text/plain")
        .unwrap()
        .with_body("hi");
    let response = rest.handle(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "got hi");
}

// ============================================================================
// Context Values
// ============================================================================

#[tokio::test]
async fn test_handler_reads_request_headers_through_context() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/trace")
            .param(MethodParameter::context::<HttpRequest>())
            .returns::<String>()
            .blocking(|args| {
                let request = args
                    .context::<HttpRequest>()
                    .ok_or_else(|| RestError::status(StatusCode::BAD_REQUEST, "no request"))?;
                Ok(Payload::some(request.header("x-trace").unwrap_or("none").to_string()))
            })
            .unwrap(),
    )
    .unwrap();

    let response = rest.handle(get("/trace").with_header("x-trace", "t-17").unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "t-17");
}

#[tokio::test]
async fn test_handler_receives_authenticated_user() {
    let mut rest = RestRouter::new();
    rest.provide(ProviderEntry::of::<RoleUser, _>(HeaderUser)).unwrap();
    rest.register(
        RouteDefinition::get("/me")
            .security(SecurityPolicy::roles(["reader"]))
            .param(MethodParameter::context::<CurrentUser>())
            .returns::<String>()
            .blocking(|args| {
                let user = args
                    .context::<CurrentUser>()
                    .ok_or_else(|| RestError::status(StatusCode::UNAUTHORIZED, "anonymous"))?;
                Ok(Payload::some(user.name().to_string()))
            })
            .unwrap(),
    )
    .unwrap();

    let request = get("/me")
        .with_header("x-user", "ada")
        .unwrap()
        .with_header("x-roles", "reader")
        .unwrap();
    let response = rest.handle(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "ada");
}

// ============================================================================
// Error Translation
// ============================================================================

#[tokio::test]
async fn test_wrapped_validation_failure_is_bad_request() {
    let recorder = Recorder::default();
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/checked")
            .returns::<String>()
            .event(EventBinding::new(
                EventTrigger::OnDefaultFailure,
                EventEntry::of::<AnyFailure, _>(recorder.clone()),
            ))
            .blocking(|_| {
                Err(RestError::invocation(RestError::validation(
                    "GET /checked",
                    vec![restbind_core::Violation::new("arg0", "too small")],
                )))
            })
            .unwrap(),
    )
    .unwrap();

    let response = rest.handle(get("/checked")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(&response).contains("arg0: too small"));
    assert!(response.is_ended());
    assert_eq!(recorder.seen(), vec!["failure 400 ValidationFailed".to_string()]);
}

#[tokio::test]
async fn test_unhandled_failure_is_internal_error_with_message() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/broken")
            .blocking(|_| Err(RestError::failed(restbind_core::Cause::message("disk on fire"))))
            .unwrap(),
    )
    .unwrap();

    let response = rest.handle(get("/broken")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&response), "disk on fire");
}

#[tokio::test]
async fn test_execution_failure_keeps_its_status() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/teapot")
            .asynchronous(|_| async { Err(RestError::status(StatusCode::IM_A_TEAPOT, "short and stout")) })
            .unwrap(),
    )
    .unwrap();

    let response = rest.handle(get("/teapot")).await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_text(&response), "short and stout");
}

#[tokio::test]
async fn test_unconvertible_query_parameter_is_bad_request() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/page")
            .param(MethodParameter::query::<u32>("n"))
            .returns::<u32>()
            .blocking(|args| Ok(Payload::some(*args.required::<u32>("n")?)))
            .unwrap(),
    )
    .unwrap();

    assert_eq!(rest.handle(get("/page?n=3")).await.status(), StatusCode::OK);
    assert_eq!(rest.handle(get("/page?n=three")).await.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Security
// ============================================================================

fn secured_router() -> RestRouter {
    let mut rest = RestRouter::new();
    rest.provide(ProviderEntry::of::<RoleUser, _>(HeaderUser)).unwrap();
    rest.register(
        RouteDefinition::get("/admin")
            .security(SecurityPolicy::roles(["admin", "editor"]))
            .returns::<String>()
            .blocking(|_| Ok(Payload::some("welcome".to_string())))
            .unwrap(),
    )
    .unwrap();
    rest
}

#[tokio::test]
async fn test_any_allowed_role_is_enough() {
    let rest = secured_router();
    let request = get("/admin")
        .with_header("x-user", "ada")
        .unwrap()
        .with_header("x-roles", "editor")
        .unwrap();

    let response = rest.handle(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "welcome");
}

#[tokio::test]
async fn test_missing_role_is_unauthorized() {
    let rest = secured_router();
    let request = get("/admin")
        .with_header("x-user", "bob")
        .unwrap()
        .with_header("x-roles", "viewer")
        .unwrap();
    assert_eq!(rest.handle(request).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(rest.handle(get("/admin")).await.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Router Hooks
// ============================================================================

#[tokio::test]
async fn test_cors_preflight_is_answered_before_routes() {
    let mut rest = RestRouter::new();
    rest.enable_cors(
        CorsStage::builder()
            .allow_origin_pattern(r"https://app\.example\.com")
            .allow_methods([Method::GET])
            .build()
            .unwrap(),
    );
    rest.register(
        RouteDefinition::get("/items")
            .blocking(|_| Ok(Payload::some("items".to_string())))
            .unwrap(),
    )
    .unwrap();

    let preflight = HttpRequest::build(Method::OPTIONS, "/items")
        .unwrap()
        .with_header("origin", "https://app.example.com")
        .unwrap()
        .with_header("access-control-request-method", "GET")
        .unwrap();
    let response = rest.handle(preflight).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.header("access-control-allow-origin"), Some("https://app.example.com"));

    let simple = get("/items").with_header("origin", "https://app.example.com").unwrap();
    let response = rest.handle(simple).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.header("vary"), Some("Origin"));
}

#[tokio::test]
async fn test_unmatched_requests_get_the_same_not_found() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/known")
            .blocking(|_| Ok(None))
            .unwrap(),
    )
    .unwrap();
    rest.not_found_default();

    let first = rest.handle(get("/unknown")).await;
    let second = rest.handle(get("/unknown")).await;
    assert_eq!(first.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&first), "Not Found");
    assert_eq!(second.status(), first.status());
    assert_eq!(second.body(), first.body());
    assert_eq!(rest.handle(get("/known")).await.status(), StatusCode::OK);
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ordered_blocking_route_runs_one_at_a_time() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut rest = RestRouter::new();
    let (running, highest) = (Arc::clone(&in_flight), Arc::clone(&peak));
    rest.register(
        RouteDefinition::get("/serial")
            .ordered(true)
            .blocking(move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                highest.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(15));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(None)
            })
            .unwrap(),
    )
    .unwrap();

    let rest = Arc::new(rest);
    let handles = (0..6)
        .map(|_| {
            let rest = Arc::clone(&rest);
            tokio::spawn(async move { rest.handle(get("/serial")).await.status() })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ordered_blocking_route_answers_in_arrival_order() {
    let mut rest = RestRouter::new();
    rest.register(
        RouteDefinition::get("/serial")
            .ordered(true)
            .param(MethodParameter::query::<u64>("i"))
            .returns::<u64>()
            .blocking(|args| {
                let i = *args.required::<u64>("i")?;
                // later arrivals finish their own work sooner
                std::thread::sleep(Duration::from_millis(40 - 6 * i));
                Ok(Payload::some(i))
            })
            .unwrap(),
    )
    .unwrap();

    let rest = Arc::new(rest);
    let answered = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..5u64 {
        let (rest, answered) = (Arc::clone(&rest), Arc::clone(&answered));
        handles.push(tokio::spawn(async move {
            let response = rest.handle(get(&format!("/serial?i={i}"))).await;
            answered.lock().unwrap().push(body_text(&response));
        }));
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let answered = answered.lock().unwrap().clone();
    assert_eq!(answered, vec!["0", "1", "2", "3", "4"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unordered_blocking_route_runs_concurrently() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut rest = RestRouter::new();
    let (running, highest) = (Arc::clone(&in_flight), Arc::clone(&peak));
    rest.register(
        RouteDefinition::get("/parallel")
            .blocking(move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                highest.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(None)
            })
            .unwrap(),
    )
    .unwrap();

    let rest = Arc::new(rest);
    let handles = (0..4)
        .map(|_| {
            let rest = Arc::clone(&rest);
            tokio::spawn(async move { rest.handle(get("/parallel")).await.status() })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert!(peak.load(Ordering::SeqCst) > 1);
}
