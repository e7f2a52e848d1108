//! Validation collaborator interface.

use crate::arguments::Arguments;
use crate::definition::RouteDefinition;
use crate::error::{RestError, Violation};
use crate::value::Payload;

/// Validates handler input and output.
///
/// An empty violation list means the value is valid.
pub trait Validator: Send + Sync {
    /// Checks bound arguments before invocation.
    fn validate_parameters(&self, definition: &RouteDefinition, arguments: &Arguments) -> Vec<Violation>;

    /// Checks the handler result after invocation.
    fn validate_return_value(&self, definition: &RouteDefinition, result: Option<&Payload>) -> Vec<Violation>;
}

/// Runs input validation, converting violations into [`RestError::ValidationFailed`].
pub fn check_parameters(
    validator: Option<&dyn Validator>,
    definition: &RouteDefinition,
    arguments: &Arguments,
) -> Result<(), RestError> {
    let Some(validator) = validator else {
        return Ok(());
    };
    let violations = validator.validate_parameters(definition, arguments);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(RestError::validation(definition.to_string(), violations))
    }
}

/// Runs output validation, converting violations into [`RestError::ValidationFailed`].
pub fn check_return_value(
    validator: Option<&dyn Validator>,
    definition: &RouteDefinition,
    result: Option<&Payload>,
) -> Result<(), RestError> {
    let Some(validator) = validator else {
        return Ok(());
    };
    let violations = validator.validate_return_value(definition, result);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(RestError::validation(definition.to_string(), violations))
    }
}
