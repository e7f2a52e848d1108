//! Catch-all handling for requests no route answered.

use std::fmt;
use std::sync::Arc;

use restbind_core::plugin::{ResponseWriter, WriterEntry};
use restbind_core::{BoxFuture, RestResult, RouteDefinition};
use restbind_extract::NotFoundResponseWriter;
use restbind_router::{Flow, RoutingContext, Stage};
use tracing::{trace, warn};

use crate::engine::Engine;
use crate::events::EventExecutor;
use crate::pipeline::produce_response;

/// Answers with a writer over a definition describing the request itself.
pub struct NotFoundStage {
    writer: WriterEntry,
    engine: Arc<Engine>,
    events: EventExecutor,
}

impl NotFoundStage {
    /// Stage answering through `writer`.
    #[must_use]
    pub const fn new(writer: WriterEntry, engine: Arc<Engine>) -> Self {
        Self {
            writer,
            engine,
            events: EventExecutor,
        }
    }

    fn process(&self, ctx: &mut RoutingContext) -> RestResult<Flow> {
        let definition = RouteDefinition::from_request(ctx.request());
        trace!(route = %definition, writer = self.writer.name(), "no route answered");
        let writer: Arc<dyn ResponseWriter> = match self.writer.get(&self.engine.container()) {
            Ok(writer) => writer,
            Err(e) => {
                warn!(writer = self.writer.name(), error = %e, "not-found writer unavailable, using the default");
                Arc::new(NotFoundResponseWriter::default())
            }
        };
        produce_response(&self.engine, &self.events, ctx, &definition, None, writer.as_ref())?;
        Ok(Flow::Done)
    }
}

impl fmt::Debug for NotFoundStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotFoundStage")
            .field("writer", &self.writer.name())
            .finish()
    }
}

impl Stage for NotFoundStage {
    fn name(&self) -> &'static str {
        "not_found"
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        let result = self.process(ctx);
        Box::pin(async move { result })
    }
}
