//! CORS (Cross-Origin Resource Sharing) stage.
//!
//! Installed on a catch-all route that runs before every other route.
//! Preflight requests are answered directly with `204 No Content`. Other
//! requests from an allowed origin get the CORS response headers and continue.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use http::Method;
//! use restbind_middleware::CorsStage;
//!
//! let cors = CorsStage::builder()
//!     .allow_origin_pattern(r"https://(app|admin)\.example\.com")
//!     .allow_methods([Method::GET, Method::POST])
//!     .allow_headers(["Content-Type", "Authorization"])
//!     .allow_credentials(true)
//!     .max_age(Duration::from_secs(3600))
//!     .build()
//!     .unwrap();
//! assert!(cors.is_origin_allowed("https://app.example.com"));
//! assert!(!cors.is_origin_allowed("https://evil.example.com"));
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use http::{Method, StatusCode};
use regex::Regex;
use restbind_core::{BoxFuture, RestError, RestResult};
use restbind_router::{Flow, RoutingContext, Stage};
use tracing::debug;

/// Route order of the CORS stage; it runs before everything else.
pub const ORDER_CORS_HANDLER: i32 = -10;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// Which origins may call.
#[derive(Debug, Clone)]
enum AllowedOrigins {
    Any,
    Pattern(Regex),
}

impl AllowedOrigins {
    fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Pattern(pattern) => pattern.is_match(origin),
        }
    }
}

/// Builder for [`CorsStage`].
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    origin_pattern: Option<String>,
    allowed_methods: BTreeSet<String>,
    allowed_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl CorsBuilder {
    /// Allows origins matching a regular expression; `*` allows any origin.
    /// The pattern must match the whole origin.
    #[must_use]
    pub fn allow_origin_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.origin_pattern = Some(pattern.into());
        self
    }

    /// Allowed methods. Leaving the set empty allows every method.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.allowed_methods = methods.into_iter().map(|m| m.as_str().to_string()).collect();
        self
    }

    /// Allowed request headers. Leaving the set empty allows every header.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Whether cookies and authorization headers may be sent.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// How long browsers may cache a preflight answer.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.max_age = Some(duration);
        self
    }

    /// Builds the stage.
    ///
    /// # Errors
    ///
    /// [`RestError::IllegalArgument`] when the origin pattern is not a valid
    /// regular expression.
    pub fn build(self) -> RestResult<CorsStage> {
        let origins = match self.origin_pattern.as_deref() {
            None | Some("*") => AllowedOrigins::Any,
            Some(pattern) => {
                let anchored = format!("^(?:{pattern})$");
                let regex = Regex::new(&anchored)
                    .map_err(|e| RestError::illegal_argument(format!("invalid CORS origin pattern '{pattern}': {e}")))?;
                AllowedOrigins::Pattern(regex)
            }
        };
        Ok(CorsStage {
            origins,
            allowed_methods: self.allowed_methods,
            allowed_headers: self.allowed_headers,
            allow_credentials: self.allow_credentials,
            max_age: self.max_age,
        })
    }
}

/// Answers preflight requests and decorates cross-origin responses.
#[derive(Debug, Clone)]
pub struct CorsStage {
    origins: AllowedOrigins,
    allowed_methods: BTreeSet<String>,
    allowed_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl CorsStage {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::default()
    }

    /// Whether `origin` may call.
    #[must_use]
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.origins.is_allowed(origin)
    }

    fn is_preflight(ctx: &RoutingContext) -> bool {
        let request = ctx.request();
        request.method() == Method::OPTIONS
            && request.header(headers::ORIGIN).is_some()
            && request.header(headers::REQUEST_METHOD).is_some()
    }

    fn allow_origin_value<'o>(&self, origin: &'o str) -> &'o str {
        match self.origins {
            AllowedOrigins::Any if !self.allow_credentials => "*",
            _ => origin,
        }
    }

    fn rejection(&self, ctx: &RoutingContext) -> Option<String> {
        let request = ctx.request();
        if !self.allowed_methods.is_empty() {
            if let Some(method) = request.header(headers::REQUEST_METHOD) {
                if !self.allowed_methods.contains(method.trim()) {
                    return Some(format!("method '{method}' not allowed"));
                }
            }
        }
        if !self.allowed_headers.is_empty() {
            if let Some(requested) = request.header(headers::REQUEST_HEADERS) {
                for header in requested.split(',').map(|h| h.trim().to_lowercase()) {
                    if !header.is_empty() && !self.allowed_headers.contains(&header) {
                        return Some(format!("header '{header}' not allowed"));
                    }
                }
            }
        }
        None
    }

    fn preflight(&self, ctx: &mut RoutingContext, origin: &str) -> RestResult<Flow> {
        if let Some(reason) = self.rejection(ctx) {
            debug!(origin, reason = %reason, "CORS preflight rejected");
            let response = ctx.response_mut();
            response.set_status(StatusCode::FORBIDDEN);
            response.end_with(format!("CORS Rejected - {reason}"))?;
            return Ok(Flow::Done);
        }

        let response = ctx.response_mut();
        response.put_header(headers::ALLOW_ORIGIN, self.allow_origin_value(origin))?;
        if self.allow_credentials {
            response.put_header(headers::ALLOW_CREDENTIALS, "true")?;
        }
        if !self.allowed_methods.is_empty() {
            let methods = self.allowed_methods.iter().map(String::as_str).collect::<Vec<_>>();
            response.put_header(headers::ALLOW_METHODS, &methods.join(","))?;
        }
        if !self.allowed_headers.is_empty() {
            let allowed = self.allowed_headers.iter().map(String::as_str).collect::<Vec<_>>();
            response.put_header(headers::ALLOW_HEADERS, &allowed.join(","))?;
        }
        if let Some(max_age) = self.max_age {
            response.put_header(headers::MAX_AGE, &max_age.as_secs().to_string())?;
        }
        response.put_header(headers::VARY, "Origin")?;
        response.set_status(StatusCode::NO_CONTENT);
        response.end()?;
        Ok(Flow::Done)
    }

    fn process(&self, ctx: &mut RoutingContext) -> RestResult<Flow> {
        let Some(origin) = ctx.request().header(headers::ORIGIN).map(str::to_string) else {
            return Ok(Flow::Next);
        };
        if !self.origins.is_allowed(&origin) {
            debug!(origin = %origin, "origin not allowed");
            if Self::is_preflight(ctx) {
                let response = ctx.response_mut();
                response.set_status(StatusCode::FORBIDDEN);
                response.end_with("CORS Rejected - Invalid origin")?;
                return Ok(Flow::Done);
            }
            return Ok(Flow::Next);
        }
        if Self::is_preflight(ctx) {
            return self.preflight(ctx, &origin);
        }

        let response = ctx.response_mut();
        response.put_header(headers::ALLOW_ORIGIN, self.allow_origin_value(&origin))?;
        if self.allow_credentials {
            response.put_header(headers::ALLOW_CREDENTIALS, "true")?;
        }
        response.put_header(headers::VARY, "Origin")?;
        Ok(Flow::Next)
    }
}

impl Stage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        let result = self.process(ctx);
        Box::pin(async move { result })
    }
}
