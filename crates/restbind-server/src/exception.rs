//! Built-in exception handlers.

use http::header::CONTENT_TYPE;
use restbind_core::plugin::{ExceptionHandler, HandlerEntry};
use restbind_core::{AnyFailure, Cause, HttpRequest, HttpResponse, RestResult};
use serde::Serialize;

/// Writes the cause's message as the body.
///
/// Used whenever no registered handler fits, or the chosen one cannot be built.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericExceptionHandler;

impl GenericExceptionHandler {
    /// Registration entry covering every failure.
    #[must_use]
    pub fn entry() -> HandlerEntry {
        HandlerEntry::of::<AnyFailure, _>(Self)
    }
}

impl ExceptionHandler for GenericExceptionHandler {
    fn write(&self, cause: &Cause, _request: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
        response.end_with(cause.message_text())
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    status: u16,
    message: String,
}

/// Writes `{"error": {"code", "status", "message"}}` with `application/json`.
///
/// `code` is the short type name of the cause.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExceptionHandler;

impl JsonExceptionHandler {
    /// Registration entry covering every failure.
    #[must_use]
    pub fn entry() -> HandlerEntry {
        HandlerEntry::of::<AnyFailure, _>(Self)
    }
}

impl ExceptionHandler for JsonExceptionHandler {
    fn write(&self, cause: &Cause, _request: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
        let envelope = Envelope {
            error: ErrorBody {
                code: cause.descriptor().tag().short_name(),
                status: response.status().as_u16(),
                message: cause.message_text(),
            },
        };
        let body = serde_json::to_string(&envelope)
            .map_err(|e| restbind_core::RestError::illegal_argument(format!("failed to encode error: {e}")))?;
        response.put_header(CONTENT_TYPE.as_str(), "application/json")?;
        response.end_with(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use restbind_core::RestError;

    fn request() -> HttpRequest {
        HttpRequest::build(Method::GET, "/").unwrap()
    }

    #[test]
    fn test_generic_writes_message() {
        let mut response = HttpResponse::new();
        let cause = Cause::message("disk on fire");
        GenericExceptionHandler.write(&cause, &request(), &mut response).unwrap();
        assert!(response.is_ended());
        assert_eq!(response.body(), b"disk on fire");
    }

    #[test]
    fn test_json_envelope() {
        let mut response = HttpResponse::new();
        response.set_status(StatusCode::UNAUTHORIZED);
        let cause = Cause::from(RestError::Unauthorized);
        JsonExceptionHandler.write(&cause, &request(), &mut response).unwrap();

        assert_eq!(response.header("content-type"), Some("application/json"));
        let json: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(json["error"]["status"], 401);
        assert_eq!(json["error"]["code"], "Unauthorized");
        assert_eq!(json["error"]["message"], "HTTP 401 Unauthorized");
    }
}
