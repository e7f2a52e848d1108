//! Cookie parsing stage, installed for routes with cookie parameters.

use http::header::COOKIE;
use restbind_core::{BoxFuture, RestResult};
use restbind_extract::parse_cookies;
use restbind_router::{Flow, RoutingContext, Stage};

/// Parses every `Cookie` header into the request's cookie parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieStage;

impl Stage for CookieStage {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        let mut cookies = restbind_router::Params::new();
        for value in ctx.request().headers().get_all(COOKIE) {
            if let Ok(text) = value.to_str() {
                for (name, value) in parse_cookies(text).iter() {
                    cookies.push(name, value);
                }
            }
        }
        ctx.parts_mut().cookies = cookies;
        Box::pin(async { Ok(Flow::Next) })
    }
}
