//! Role-based security stage.
//!
//! `PermitAll` lets every request through and `DenyAll` rejects every
//! request. With a role list, a request needs an authenticated user holding
//! at least one of the roles. Role checks run concurrently.

use std::sync::Arc;

use futures_util::future::join_all;
use restbind_core::{BoxFuture, RestError, RestResult, SecurityPolicy, User};
use restbind_router::{Flow, RoutingContext, Stage};
use tracing::{debug, warn};

/// Enforces a route's [`SecurityPolicy`].
#[derive(Debug, Clone)]
pub struct SecurityStage {
    policy: SecurityPolicy,
}

impl SecurityStage {
    /// Stage enforcing `policy`.
    #[must_use]
    pub const fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }

    /// The enforced policy.
    #[must_use]
    pub const fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }
}

impl Stage for SecurityStage {
    fn name(&self) -> &'static str {
        "security"
    }

    fn handle<'a>(&'a self, ctx: &'a mut RoutingContext) -> BoxFuture<'a, RestResult<Flow>> {
        let user = ctx.user().cloned();
        Box::pin(async move {
            match &self.policy {
                SecurityPolicy::PermitAll => Ok(Flow::Next),
                SecurityPolicy::DenyAll => Err(RestError::Unauthorized),
                SecurityPolicy::RolesAllowed(roles) => {
                    let Some(user) = user else {
                        debug!("no authenticated user for a secured route");
                        return Err(RestError::Unauthorized);
                    };
                    if any_role(&user, roles).await {
                        Ok(Flow::Next)
                    } else {
                        Err(RestError::Unauthorized)
                    }
                }
            }
        })
    }
}

async fn any_role(user: &Arc<dyn User>, roles: &[String]) -> bool {
    let checks = roles.iter().map(|role| user.is_authorized(role));
    let mut granted = false;
    for (role, outcome) in roles.iter().zip(join_all(checks).await) {
        match outcome {
            Ok(true) => granted = true,
            Ok(false) => {}
            Err(e) => warn!(user = user.name(), role = %role, error = %e, "role check failed"),
        }
    }
    granted
}
