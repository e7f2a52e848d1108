//! Failure translation.
//!
//! Every error raised by a stage ends up here. It is classified into a status
//! and a cause, the most specific exception handler for the cause writes the
//! body, and the route's events run against the failure. The response is
//! always ended afterwards, whatever goes wrong on the way.

use std::sync::Arc;

use http::StatusCode;
use restbind_core::plugin::{ExceptionHandler, Outcome};
use restbind_core::{BoxFuture, Cause, HttpRequest, HttpResponse, RestError, RestResult, RouteDefinition};
use restbind_extract::{best_match, Direction};
use restbind_router::{FailureHandler, RoutingContext};
use tracing::{debug, error, warn};

use crate::engine::Engine;
use crate::events::EventExecutor;
use crate::exception::GenericExceptionHandler;

/// Normalizes `error` into the status to answer with and the cause to report.
///
/// Invocation and handler wrappers around a [`RestError`] are unwrapped and
/// classified again.
#[must_use]
pub fn classify(error: RestError) -> (StatusCode, Cause) {
    match error {
        RestError::Execution { status, cause } => (status, cause),
        RestError::Invocation(cause) | RestError::Handler(cause) => match cause.as_rest_error() {
            Some(inner) => classify(inner.clone()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, cause),
        },
        error @ (RestError::ValidationFailed { .. }
        | RestError::IllegalArgument(_)
        | RestError::MissingParameter { .. }
        | RestError::ParameterConversionFailed { .. }) => (StatusCode::BAD_REQUEST, Cause::from(error)),
        RestError::Unauthorized => (StatusCode::UNAUTHORIZED, Cause::from(RestError::Unauthorized)),
        other => (StatusCode::INTERNAL_SERVER_ERROR, Cause::from(other)),
    }
}

/// The engine's [`FailureHandler`].
#[derive(Debug)]
pub struct ErrorTranslator {
    engine: Arc<Engine>,
    events: EventExecutor,
}

impl ErrorTranslator {
    /// Translator resolving handlers from `engine`.
    #[must_use]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            events: EventExecutor,
        }
    }

    /// Route overrides first, then the registry. `Ok(None)` when nothing fits.
    fn resolve(
        &self,
        definition: Option<&RouteDefinition>,
        cause: &Cause,
    ) -> RestResult<Option<Arc<dyn ExceptionHandler>>> {
        let overrides = definition.map(RouteDefinition::exception_handlers).unwrap_or_default();
        let resolved = best_match(Direction::Consumes, overrides, cause.descriptor(), &[])
            .or_else(|| self.engine.registry().exception_handler_for(cause.descriptor()));
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        debug!(cause = %cause.descriptor(), handler = resolved.entry.name(), "exception handler selected");
        resolved.entry.get(&self.engine.container()).map(Some)
    }

    /// Writes the failure response for `error` and runs the failure events.
    pub fn translate(&self, error: RestError, ctx: &mut RoutingContext) {
        let definition = ctx.definition().cloned();
        let (mut status, cause) = classify(error);
        debug!(status = status.as_u16(), cause = %cause.descriptor(), message = %cause, "translating failure");

        if ctx.response().is_ended() {
            error!(status = status.as_u16(), error = %cause, "failure after the response was ended");
            return;
        }

        let handler = match self.resolve(definition.as_deref(), &cause) {
            Ok(Some(handler)) => handler,
            Ok(None) => Arc::new(GenericExceptionHandler),
            Err(e) => {
                error!(error = %e, "exception handler unavailable, falling back to the generic handler");
                status = StatusCode::INTERNAL_SERVER_ERROR;
                Arc::new(GenericExceptionHandler)
            }
        };

        let container = self.engine.container();
        let (request, response) = ctx.split();
        if let Err(e) = write_failure(handler.as_ref(), definition.as_deref(), status, &cause, request, response) {
            error!(error = %e, "exception handler failed");
        }
        self.events.trigger(
            definition.as_deref(),
            Some(Outcome::Failure(&cause)),
            response.status(),
            request,
            &container,
        );
        if !response.is_ended() {
            if let Err(e) = response.end() {
                warn!(error = %e, "failed to end failure response");
            }
        }
    }
}

fn write_failure(
    handler: &dyn ExceptionHandler,
    definition: Option<&RouteDefinition>,
    status: StatusCode,
    cause: &Cause,
    request: &HttpRequest,
    response: &mut HttpResponse,
) -> RestResult<()> {
    response.set_status(status);
    handler.add_response_headers(definition, response)?;
    handler.write(cause, request, response)
}

impl FailureHandler for ErrorTranslator {
    fn handle_failure<'a>(&'a self, error: RestError, ctx: &'a mut RoutingContext) -> BoxFuture<'a, ()> {
        self.translate(error, ctx);
        Box::pin(async {})
    }
}
