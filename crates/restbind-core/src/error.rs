//! Error taxonomy for the dispatch engine.
//!
//! [`RestError`] is the single error type that travels through binding,
//! validation, invocation and response production. Each variant also has a
//! [`TypeDescriptor`] (see [`ErrorKind::descriptor`]) so exception handlers can
//! be registered for a specific kind, exactly like for user failure types.
//!
//! | Kind | Default status |
//! |---|---|
//! | `TypeMismatch` | 500 |
//! | `PluginConstructionFailed` | 500 |
//! | `MissingParameter` | 400 |
//! | `ParameterConversionFailed` | 400 |
//! | `ValidationFailed` | 400 |
//! | `IllegalArgument` | 400 |
//! | `Unauthorized` | 401 |
//! | `Execution` | carried |
//! | `Invocation` / `Handler` | classified from the wrapped cause |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definition::ParamSource;
use crate::types::{TypeDescriptor, TypeTag, Typed};
use crate::value::Cause;

/// Result type alias using [`RestError`].
pub type RestResult<T> = Result<T, RestError>;

/// A single constraint violation reported by a validation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Path of the offending value (e.g. `arg0.name` or `return`).
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

impl Violation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised anywhere in the dispatch pipeline.
#[derive(Error, Debug, Clone)]
pub enum RestError {
    /// Declared and runtime types are incompatible.
    #[error("{message}")]
    TypeMismatch {
        /// Description naming both types and the route.
        message: String,
    },

    /// A plugin could not be constructed or injected.
    #[error("failed to construct {plugin}: {reason}")]
    PluginConstructionFailed {
        /// Name of the plugin type.
        plugin: String,
        /// Why construction failed.
        reason: String,
    },

    /// A required parameter was not present in the request.
    #[error("missing {location} parameter '{name}'")]
    MissingParameter {
        /// Where the parameter was looked up.
        location: ParamSource,
        /// Parameter name.
        name: String,
    },

    /// A parameter could not be coerced into its declared type.
    #[error("failed to convert {location} parameter '{name}' to {expected}: {reason}")]
    ParameterConversionFailed {
        /// Where the parameter was read from.
        location: ParamSource,
        /// Parameter name.
        name: String,
        /// Declared type.
        expected: String,
        /// Conversion error.
        reason: String,
    },

    /// The validation collaborator reported violations.
    #[error("{route} - validation failed: {}", summarize(.violations))]
    ValidationFailed {
        /// Route description (`METHOD path`).
        route: String,
        /// Reported violations.
        violations: Vec<Violation>,
    },

    /// Security check failed.
    #[error("HTTP 401 Unauthorized")]
    Unauthorized,

    /// An argument or registration input was invalid.
    #[error("{0}")]
    IllegalArgument(String),

    /// A failure with an explicit status code.
    #[error("{cause}")]
    Execution {
        /// Status to respond with.
        status: StatusCode,
        /// Underlying cause.
        cause: Cause,
    },

    /// Wrapper around a failure raised while invoking a handler.
    #[error("invocation failed: {0}")]
    Invocation(Cause),

    /// A typed failure raised by user code.
    #[error("{0}")]
    Handler(Cause),
}

impl RestError {
    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    /// Creates a plugin construction error.
    #[must_use]
    pub fn plugin_construction(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PluginConstructionFailed {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing parameter error.
    #[must_use]
    pub fn missing_parameter(location: ParamSource, name: impl Into<String>) -> Self {
        Self::MissingParameter {
            location,
            name: name.into(),
        }
    }

    /// Creates a parameter conversion error.
    #[must_use]
    pub fn conversion(
        location: ParamSource,
        name: impl Into<String>,
        expected: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ParameterConversionFailed {
            location,
            name: name.into(),
            expected: expected.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(route: impl Into<String>, violations: Vec<Violation>) -> Self {
        Self::ValidationFailed {
            route: route.into(),
            violations,
        }
    }

    /// Creates an illegal argument error.
    #[must_use]
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    /// Creates an execution failure with an explicit status and plain message.
    #[must_use]
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Execution {
            status,
            cause: Cause::message(message),
        }
    }

    /// Creates an execution failure with an explicit status and cause.
    #[must_use]
    pub fn execution(status: StatusCode, cause: Cause) -> Self {
        Self::Execution { status, cause }
    }

    /// Wraps a failure raised by an invoked handler.
    #[must_use]
    pub fn invocation(cause: impl Into<Cause>) -> Self {
        Self::Invocation(cause.into())
    }

    /// Wraps a typed user failure.
    #[must_use]
    pub fn failed(cause: impl Into<Cause>) -> Self {
        Self::Handler(cause.into())
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::PluginConstructionFailed { .. } => ErrorKind::PluginConstructionFailed,
            Self::MissingParameter { .. } => ErrorKind::MissingParameter,
            Self::ParameterConversionFailed { .. } => ErrorKind::ParameterConversionFailed,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::IllegalArgument(_) => ErrorKind::IllegalArgument,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Invocation(_) => ErrorKind::Invocation,
            Self::Handler(_) => ErrorKind::Handler,
        }
    }

    /// Returns the descriptor of this error's kind.
    #[must_use]
    pub fn descriptor(&self) -> TypeDescriptor {
        self.kind().descriptor()
    }

    /// Whether this error is a type mismatch (hard compatibility failure).
    #[must_use]
    pub const fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

impl Typed for RestError {
    fn descriptor() -> TypeDescriptor {
        ErrorKind::any()
    }
}

/// Discriminant of [`RestError`], usable as an exception-handler target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`RestError::TypeMismatch`].
    TypeMismatch,
    /// See [`RestError::PluginConstructionFailed`].
    PluginConstructionFailed,
    /// See [`RestError::MissingParameter`].
    MissingParameter,
    /// See [`RestError::ParameterConversionFailed`].
    ParameterConversionFailed,
    /// See [`RestError::ValidationFailed`].
    ValidationFailed,
    /// See [`RestError::Unauthorized`].
    Unauthorized,
    /// See [`RestError::IllegalArgument`].
    IllegalArgument,
    /// See [`RestError::Execution`].
    Execution,
    /// See [`RestError::Invocation`].
    Invocation,
    /// See [`RestError::Handler`].
    Handler,
}

/// Tags for each error kind. Kinds are distinct types so handlers can target them.
mod kinds {
    #[derive(Debug)]
    pub enum TypeMismatch {}
    #[derive(Debug)]
    pub enum PluginConstructionFailed {}
    #[derive(Debug)]
    pub enum MissingParameter {}
    #[derive(Debug)]
    pub enum ParameterConversionFailed {}
    #[derive(Debug)]
    pub enum ValidationFailed {}
    #[derive(Debug)]
    pub enum Unauthorized {}
    #[derive(Debug)]
    pub enum IllegalArgument {}
    #[derive(Debug)]
    pub enum Execution {}
    #[derive(Debug)]
    pub enum Invocation {}
    #[derive(Debug)]
    pub enum Handler {}
}

impl ErrorKind {
    /// Tag of this kind.
    #[must_use]
    pub fn tag(self) -> TypeTag {
        match self {
            Self::TypeMismatch => TypeTag::of::<kinds::TypeMismatch>(),
            Self::PluginConstructionFailed => TypeTag::of::<kinds::PluginConstructionFailed>(),
            Self::MissingParameter => TypeTag::of::<kinds::MissingParameter>(),
            Self::ParameterConversionFailed => TypeTag::of::<kinds::ParameterConversionFailed>(),
            Self::ValidationFailed => TypeTag::of::<kinds::ValidationFailed>(),
            Self::Unauthorized => TypeTag::of::<kinds::Unauthorized>(),
            Self::IllegalArgument => TypeTag::of::<kinds::IllegalArgument>(),
            Self::Execution => TypeTag::of::<kinds::Execution>(),
            Self::Invocation => TypeTag::of::<kinds::Invocation>(),
            Self::Handler => TypeTag::of::<kinds::Handler>(),
        }
    }

    /// Descriptor of this kind: the kind itself, then [`RestError`], then any failure.
    #[must_use]
    pub fn descriptor(self) -> TypeDescriptor {
        TypeDescriptor::from_tag(self.tag())
            .extends::<RestError>()
            .failure()
    }

    /// Descriptor matching every [`RestError`] kind.
    #[must_use]
    pub fn any() -> TypeDescriptor {
        TypeDescriptor::of::<RestError>().failure()
    }
}
