//! Typed values flowing through the pipeline: success payloads and failure causes.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::RestError;
use crate::types::{TypeDescriptor, Typed};

/// An owned, type-erased value.
pub type BoxedValue = Box<dyn Any + Send + Sync>;

type Render = fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value, String>;

fn render_serialize<T: Serialize + 'static>(
    value: &(dyn Any + Send + Sync),
) -> Result<serde_json::Value, String> {
    let typed = value
        .downcast_ref::<T>()
        .ok_or_else(|| format!("payload is not a {}", std::any::type_name::<T>()))?;
    serde_json::to_value(typed).map_err(|e| e.to_string())
}

fn render_opaque(_: &(dyn Any + Send + Sync)) -> Result<serde_json::Value, String> {
    Err("payload has no serialized form".to_string())
}

/// A successful handler result together with its runtime type.
///
/// ```
/// use restbind_core::{typed, Payload};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Widget { name: String }
/// typed!(Widget);
///
/// let payload = Payload::new(Widget { name: "gear".into() });
/// assert_eq!(payload.descriptor().tag().short_name(), "Widget");
/// assert_eq!(payload.to_json().unwrap()["name"], "gear");
/// assert_eq!(payload.downcast_ref::<Widget>().map(|w| w.name.as_str()), Some("gear"));
/// ```
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    descriptor: TypeDescriptor,
    render: Render,
}

impl Payload {
    /// Wraps a serializable value.
    pub fn new<T: Typed + Serialize>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            descriptor: T::descriptor(),
            render: render_serialize::<T>,
        }
    }

    /// Wraps a value with no serialized form. Writers must know its type.
    pub fn opaque<T: Typed>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            descriptor: T::descriptor(),
            render: render_opaque,
        }
    }

    /// Shorthand for `Some(Payload::new(value))`.
    pub fn some<T: Typed + Serialize>(value: T) -> Option<Self> {
        Some(Self::new(value))
    }

    /// Runtime type of the payload.
    #[must_use]
    pub const fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Borrows the payload as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// The payload rendered as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, RestError> {
        (self.render)(self.value.as_ref()).map_err(|reason| {
            RestError::type_mismatch(format!(
                "cannot serialize '{}': {reason}",
                self.descriptor
            ))
        })
    }

    /// The payload's string form: strings verbatim, everything else as JSON text.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self.to_json() {
            Ok(serde_json::Value::String(text)) => text,
            Ok(serde_json::Value::Null) => String::new(),
            Ok(other) => other.to_string(),
            Err(_) => self.descriptor.tag().short_name().to_string(),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.descriptor.to_string())
            .finish_non_exhaustive()
    }
}

/// Plain message failure, used when no richer error type is available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FailureMessage(pub String);

crate::typed!(failure FailureMessage);

/// Arbitrary error wrapped by [`anyhow`], recorded with its own tag.
#[derive(Debug)]
pub enum Opaque {}

/// A typed failure cause.
///
/// The descriptor drives exception-handler and event resolution; the error
/// itself provides the message and can be downcast by handlers.
#[derive(Clone)]
pub struct Cause {
    descriptor: TypeDescriptor,
    error: Arc<dyn StdError + Send + Sync>,
}

impl Cause {
    /// Wraps a typed error.
    pub fn new<E: Typed + StdError>(error: E) -> Self {
        Self {
            descriptor: E::descriptor(),
            error: Arc::new(error),
        }
    }

    /// A cause carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(FailureMessage(message.into()))
    }

    /// Wraps an arbitrary error without type information.
    #[must_use]
    pub fn opaque(error: anyhow::Error) -> Self {
        let boxed: Box<dyn StdError + Send + Sync> = error.into();
        Self {
            descriptor: TypeDescriptor::of::<Opaque>().failure(),
            error: Arc::from(boxed),
        }
    }

    /// Runtime type of the cause.
    #[must_use]
    pub const fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The cause's message.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.error.to_string()
    }

    /// Borrows the underlying error as `E`.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// The underlying [`RestError`], when the cause is one.
    #[must_use]
    pub fn as_rest_error(&self) -> Option<&RestError> {
        self.downcast_ref::<RestError>()
    }
}

impl From<RestError> for Cause {
    fn from(error: RestError) -> Self {
        Self {
            descriptor: error.descriptor(),
            error: Arc::new(error),
        }
    }
}

impl From<anyhow::Error> for Cause {
    fn from(error: anyhow::Error) -> Self {
        Self::opaque(error)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cause")
            .field("type", &self.descriptor.to_string())
            .field("error", &self.error)
            .finish()
    }
}
