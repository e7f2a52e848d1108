//! Request body stage.
//!
//! Installed for routes that declare a body or form parameter. Rejects bodies
//! over the configured limit with 413 and decodes URL-encoded forms into the
//! request's form parameters.

use http::StatusCode;
use restbind_core::{BoxFuture, MediaType, RestError, RestResult};
use restbind_extract::parse_form;
use restbind_router::{Flow, RoutingContext, Stage};
use tracing::trace;

/// Enforces the body limit and parses form bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyStage {
    limit: Option<usize>,
}

impl BodyStage {
    /// Stage without a size limit.
    #[must_use]
    pub const fn new() -> Self {
        Self { limit: None }
    }

    /// Stage rejecting bodies larger than `limit` bytes.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    fn process(&self, ctx: &mut RoutingContext) -> RestResult<Flow> {
        let size = ctx.request().body().len();
        if let Some(limit) = self.limit {
            if size > limit {
                return Err(RestError::status(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("request body of {size} bytes exceeds the {limit} byte limit"),
                ));
            }
        }

        let is_form = ctx
            .request()
            .content_type()
            .is_some_and(|media| media.matches(&MediaType::form()));
        if is_form {
            let form = parse_form(ctx.request().body())?;
            trace!(fields = form.len(), "form body decoded");
            ctx.parts_mut().form = form;
        }
        Ok(Flow::Next)
    }
}

impl Stage for BodyStage {
    fn name(&self) -> &'static str {
        "body"
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        let result = self.process(ctx);
        Box::pin(async move { result })
    }
}
