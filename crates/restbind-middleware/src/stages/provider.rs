//! Context provider stage.
//!
//! Runs a provider on every request and stores what it returns in the
//! request data, keyed by type. A provided user also becomes the request's
//! authenticated user.

use std::fmt;
use std::sync::Arc;

use restbind_core::plugin::ContextProvider;
use restbind_core::{BoxFuture, RestResult};
use restbind_router::{Flow, RoutingContext, Stage};
use tracing::trace;

/// Route order of provider stages; they run after CORS and before any route.
pub const ORDER_PROVIDER_HANDLER: i32 = -5;

/// Stage wrapping one [`ContextProvider`].
pub struct ContextProviderStage {
    provider: Arc<dyn ContextProvider>,
    plugin: &'static str,
}

impl ContextProviderStage {
    /// Stage running `provider`; `plugin` names it in logs.
    pub fn new(provider: Arc<dyn ContextProvider>, plugin: &'static str) -> Self {
        Self { provider, plugin }
    }

    fn process(&self, ctx: &mut RoutingContext) -> RestResult<Flow> {
        let Some(value) = self.provider.provide(ctx.request())? else {
            return Ok(Flow::Next);
        };
        trace!(provider = self.plugin, kind = %value.descriptor(), "context value provided");
        if let Some(user) = value.as_user() {
            ctx.set_user(user);
        }
        ctx.parts_mut().data.insert(value);
        Ok(Flow::Next)
    }
}

impl fmt::Debug for ContextProviderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextProviderStage")
            .field("provider", &self.plugin)
            .finish()
    }
}

impl Stage for ContextProviderStage {
    fn name(&self) -> &'static str {
        "context_provider"
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        let result = self.process(ctx);
        Box::pin(async move { result })
    }
}
