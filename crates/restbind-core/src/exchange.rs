//! Transport-neutral request and response model.
//!
//! [`HttpResponse`] tracks whether it has been ended. Writing to an ended
//! response is an error, and [`HttpResponse::end`] only succeeds once, which is
//! how the pipeline guarantees a single terminal write per request.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::trace;

use crate::error::{RestError, RestResult};
use crate::media::MediaType;

/// An incoming request with a fully collected body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

crate::typed!(HttpRequest);

impl HttpRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    /// Shorthand for a request built from a method and a path-and-query string.
    pub fn build(method: Method, target: &str) -> RestResult<Self> {
        let uri = target
            .parse::<Uri>()
            .map_err(|e| RestError::illegal_argument(format!("invalid uri '{target}': {e}")))?;
        Ok(Self::new(method, uri))
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: &str) -> RestResult<Self> {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the peer address.
    #[must_use]
    pub const fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Converts a transport request.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr,
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// All headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed `Content-Type`.
    #[must_use]
    pub fn content_type(&self) -> Option<MediaType> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| MediaType::parse(v).ok())
    }

    /// Acceptable media types, most preferred first.
    #[must_use]
    pub fn accept(&self) -> Vec<MediaType> {
        MediaType::parse_accept(self.headers.get(ACCEPT).and_then(|v| v.to_str().ok()))
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Peer address, when known.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// An outgoing response that can be ended exactly once.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    ended: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    /// A fresh `200 OK` response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            ended: false,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status. Ignored once the response is ended.
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        if self.ended {
            trace!(current = %self.status, ignored = %status, "status change after end");
        } else {
            self.status = status;
        }
        self
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replaces a header.
    pub fn put_header(&mut self, name: &str, value: &str) -> RestResult<()> {
        self.ensure_open()?;
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Appends a header value.
    pub fn append_header(&mut self, name: &str, value: &str) -> RestResult<()> {
        self.ensure_open()?;
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Appends body bytes.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> RestResult<()> {
        self.ensure_open()?;
        self.body.extend_from_slice(chunk.as_ref());
        Ok(())
    }

    /// Ends the response.
    pub fn end(&mut self) -> RestResult<()> {
        self.ensure_open()?;
        self.ended = true;
        Ok(())
    }

    /// Writes a final chunk and ends the response.
    pub fn end_with(&mut self, chunk: impl AsRef<[u8]>) -> RestResult<()> {
        self.write(chunk)?;
        self.end()
    }

    /// Whether the response has been ended.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Body written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts into a transport response.
    #[must_use]
    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body.freeze());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    fn ensure_open(&self) -> RestResult<()> {
        if self.ended {
            Err(RestError::status(
                StatusCode::INTERNAL_SERVER_ERROR,
                "response has already been written",
            ))
        } else {
            Ok(())
        }
    }
}

fn header_pair(name: &str, value: &str) -> RestResult<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| RestError::illegal_argument(format!("invalid header name '{name}': {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| RestError::illegal_argument(format!("invalid header value for '{name}': {e}")))?;
    Ok((name, value))
}
