//! Built-in response writers.
//!
//! Every writer here ends the response it writes.

use http::header::CONTENT_TYPE;
use http::StatusCode;
use restbind_core::plugin::{ResponseWriter, WriterEntry};
use restbind_core::{Anything, HttpRequest, HttpResponse, MediaType, Payload, RestResult};

/// Writes the result's text form: strings verbatim, other values as JSON text.
///
/// Also the fallback when no registered writer fits.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericResponseWriter;

impl GenericResponseWriter {
    /// Registration entry for `text/plain`, any type.
    #[must_use]
    pub fn text_entry() -> WriterEntry {
        WriterEntry::of::<Anything, _>(Self).with_media(MediaType::text())
    }
}

impl ResponseWriter for GenericResponseWriter {
    fn write(&self, result: Option<&Payload>, _request: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
        match result {
            Some(payload) => response.end_with(payload.to_text()),
            None => response.end(),
        }
    }
}

/// Serializes the result as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonResponseWriter;

impl JsonResponseWriter {
    /// Registration entry for `application/json`, any type.
    #[must_use]
    pub fn entry() -> WriterEntry {
        WriterEntry::of::<Anything, _>(Self).with_media(MediaType::json())
    }
}

impl ResponseWriter for JsonResponseWriter {
    fn write(&self, result: Option<&Payload>, _request: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
        let Some(payload) = result else {
            return response.end();
        };
        let body = payload.to_json()?.to_string();
        if response.headers().get(CONTENT_TYPE).is_none() {
            response.put_header(CONTENT_TYPE.as_str(), "application/json")?;
        }
        response.end_with(body)
    }
}

/// Answers requests no route handled.
#[derive(Debug, Clone)]
pub struct NotFoundResponseWriter {
    message: String,
}

impl Default for NotFoundResponseWriter {
    fn default() -> Self {
        Self::new("Not Found")
    }
}

impl NotFoundResponseWriter {
    /// Writer answering 404 with `message` as the body.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ResponseWriter for NotFoundResponseWriter {
    fn write(&self, _result: Option<&Payload>, _request: &HttpRequest, response: &mut HttpResponse) -> RestResult<()> {
        response.set_status(StatusCode::NOT_FOUND);
        response.end_with(&self.message)
    }
}
