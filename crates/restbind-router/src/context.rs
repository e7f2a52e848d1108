//! Per-request routing state.

use std::fmt;
use std::sync::Arc;

use restbind_core::{ContextData, HttpRequest, HttpResponse, MediaType, RouteDefinition, User};

use crate::params::Params;

/// Everything read from the request or produced by earlier stages.
///
/// Cloning is cheap, so blocking work can take its own copy.
#[derive(Clone)]
pub struct RequestParts {
    request: Arc<HttpRequest>,
    /// Path parameters of the current route.
    pub params: Params,
    /// Matrix parameters found in the path.
    pub matrix: Params,
    /// Parsed cookies (filled by the cookie stage).
    pub cookies: Params,
    /// Parsed form fields (filled by the body stage).
    pub form: Params,
    /// Values supplied by context providers.
    pub data: ContextData,
    /// Authenticated user, if any.
    pub user: Option<Arc<dyn User>>,
    /// Response media type negotiated against the route's `produces`.
    pub acceptable: Option<MediaType>,
}

impl RequestParts {
    /// Wraps a request with empty derived state.
    #[must_use]
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request: Arc::new(request),
            params: Params::new(),
            matrix: Params::new(),
            cookies: Params::new(),
            form: Params::new(),
            data: ContextData::new(),
            user: None,
            acceptable: None,
        }
    }

    /// The request.
    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Shared handle to the request.
    #[must_use]
    pub fn request_arc(&self) -> Arc<HttpRequest> {
        Arc::clone(&self.request)
    }

    /// Media types to try when writing a response, most preferred first.
    #[must_use]
    pub fn response_media(&self) -> Vec<MediaType> {
        match &self.acceptable {
            Some(media) => vec![media.clone()],
            None => self.request.accept(),
        }
    }
}

impl fmt::Debug for RequestParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestParts")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("params", &self.params)
            .field("cookies", &self.cookies.len())
            .field("data", &self.data.len())
            .field("user", &self.user.as_ref().map(|u| u.name().to_string()))
            .field("acceptable", &self.acceptable)
            .finish()
    }
}

/// State threaded through a request's stage chain.
#[derive(Debug)]
pub struct RoutingContext {
    parts: RequestParts,
    response: HttpResponse,
    definition: Option<Arc<RouteDefinition>>,
}

impl RoutingContext {
    /// Starts routing `request`.
    #[must_use]
    pub fn new(request: HttpRequest) -> Self {
        Self {
            parts: RequestParts::new(request),
            response: HttpResponse::new(),
            definition: None,
        }
    }

    /// The request.
    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        self.parts.request()
    }

    /// Request-derived state.
    #[must_use]
    pub const fn parts(&self) -> &RequestParts {
        &self.parts
    }

    /// Mutable request-derived state.
    pub fn parts_mut(&mut self) -> &mut RequestParts {
        &mut self.parts
    }

    /// The response.
    #[must_use]
    pub const fn response(&self) -> &HttpResponse {
        &self.response
    }

    /// Mutable response.
    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    /// Request and response borrowed together.
    pub fn split(&mut self) -> (&HttpRequest, &mut HttpResponse) {
        (self.parts.request(), &mut self.response)
    }

    /// Definition of the route currently running, if it has one.
    #[must_use]
    pub fn definition(&self) -> Option<&Arc<RouteDefinition>> {
        self.definition.as_ref()
    }

    /// Sets the current route definition.
    pub fn set_definition(&mut self, definition: Option<Arc<RouteDefinition>>) {
        self.definition = definition;
    }

    /// Authenticated user.
    #[must_use]
    pub fn user(&self) -> Option<&Arc<dyn User>> {
        self.parts.user.as_ref()
    }

    /// Installs the authenticated user.
    pub fn set_user(&mut self, user: Arc<dyn User>) {
        self.parts.user = Some(user);
    }

    /// Consumes the context, returning the response.
    #[must_use]
    pub fn into_response(self) -> HttpResponse {
        self.response
    }
}
