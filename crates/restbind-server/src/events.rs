//! Lifecycle event execution.
//!
//! After a response is produced, every event binding declared on the route is
//! checked against the outcome and the final status. Bindings run in
//! declaration order; a failing event is logged and never affects the response
//! or the remaining events.

use http::StatusCode;
use restbind_core::plugin::Outcome;
use restbind_core::{Container, EventBinding, EventTrigger, HttpRequest, RouteDefinition};
use tracing::{debug, error};

/// Runs the event bindings of a route.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventExecutor;

impl EventExecutor {
    /// Whether `binding` fires for `outcome` at `status`.
    #[must_use]
    pub fn matches(binding: &EventBinding, outcome: &Outcome<'_>, status: StatusCode) -> bool {
        let triggered = match binding.trigger() {
            EventTrigger::OnStatus(expected) => expected == status,
            EventTrigger::OnDefaultSuccess => status.is_success() && !outcome.is_failure(),
            EventTrigger::OnDefaultFailure => outcome.is_failure(),
        };
        if !triggered {
            return false;
        }
        let target = binding
            .required_type()
            .unwrap_or_else(|| binding.handler().target());
        outcome.descriptor().is_assignable_to(target)
    }

    /// Fires every matching binding of `definition`.
    ///
    /// Returns the number of events that ran successfully. A `None` outcome
    /// fires nothing.
    pub fn trigger(
        &self,
        definition: Option<&RouteDefinition>,
        outcome: Option<Outcome<'_>>,
        status: StatusCode,
        request: &HttpRequest,
        container: &Container,
    ) -> usize {
        let (Some(definition), Some(outcome)) = (definition, outcome) else {
            return 0;
        };

        let mut fired = 0;
        for binding in definition.events() {
            if !Self::matches(binding, &outcome, status) {
                continue;
            }
            let name = binding.handler().name();
            let event = match binding.handler().get(container) {
                Ok(event) => event,
                Err(e) => {
                    error!(route = %definition, event = name, error = %e, "failed to construct event handler");
                    continue;
                }
            };
            match event.execute(outcome, status, request) {
                Ok(()) => {
                    debug!(route = %definition, event = name, status = status.as_u16(), "event executed");
                    fired += 1;
                }
                Err(e) => error!(route = %definition, event = name, error = %e, "event handler failed"),
            }
        }
        fired
    }
}
