//! Stage contract.
//!
//! A route is an ordered list of stages. Each stage either lets the request
//! continue ([`Flow::Next`]) or finishes it ([`Flow::Done`]). A stage error is
//! handed to the router's [`FailureHandler`] and ends the chain.

use restbind_core::{BoxFuture, RestError, RestResult};
use tracing::error;

use crate::context::RoutingContext;

/// What happens after a stage completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next stage, then the next matching route.
    Next,
    /// Stop; the stage produced (or owns) the response.
    Done,
}

/// A unit of request processing attached to a route.
pub trait Stage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>>;
}

/// Receives errors raised by stages.
pub trait FailureHandler: Send + Sync {
    /// Produces a response for `error`. Must leave the response ended.
    fn handle_failure<'a>(&'a self, error: RestError, ctx: &'a mut RoutingContext) -> BoxFuture<'a, ()>;
}

/// Writes the error message with 500, or 401 for authorization failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFailureHandler;

impl FailureHandler for PlainFailureHandler {
    fn handle_failure<'a>(&'a self, error: RestError, ctx: &'a mut RoutingContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let status = match &error {
                RestError::Execution { status, .. } => *status,
                RestError::Unauthorized => http::StatusCode::UNAUTHORIZED,
                _ => http::StatusCode::INTERNAL_SERVER_ERROR,
            };
            let response = ctx.response_mut();
            if response.is_ended() {
                error!(error = %error, "failure after response was ended");
                return;
            }
            response.set_status(status);
            if let Err(e) = response.end_with(error.to_string()) {
                error!(error = %e, "failed to end response");
            }
        })
    }
}

/// A stage built from a synchronous closure.
pub struct FnStage<F> {
    name: &'static str,
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut RoutingContext) -> RestResult<Flow> + Send + Sync,
{
    /// Wraps `f`.
    pub const fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(&mut RoutingContext) -> RestResult<Flow> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        let result = (self.f)(ctx);
        Box::pin(async move { result })
    }
}

impl<F> std::fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}
