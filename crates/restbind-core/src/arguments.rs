//! Bound call arguments handed to route handlers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::definition::ParamSource;
use crate::error::{RestError, RestResult};
use crate::value::BoxedValue;

/// A bound argument value.
pub enum ArgValue {
    /// Value produced for this request only.
    Owned(BoxedValue),
    /// Value shared with request-scoped context data.
    Shared(Arc<dyn Any + Send + Sync>),
}

impl ArgValue {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        match self {
            Self::Owned(value) => value.as_ref(),
            Self::Shared(value) => value.as_ref(),
        }
    }
}

struct Slot {
    name: String,
    source: ParamSource,
    value: Option<ArgValue>,
}

/// Ordered, named arguments for one invocation.
///
/// ```
/// use restbind_core::{Arguments, ArgValue, ParamSource};
///
/// let mut args = Arguments::new();
/// args.push("id", ParamSource::Path, Some(ArgValue::Owned(Box::new(7_u64))));
/// args.push("q", ParamSource::Query, None);
///
/// assert_eq!(args.get::<u64>("id"), Some(&7));
/// assert_eq!(args.get::<String>("q"), None);
/// assert!(args.required::<String>("q").is_err());
/// ```
#[derive(Default)]
pub struct Arguments {
    slots: Vec<Slot>,
}

impl Arguments {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument.
    pub fn push(&mut self, name: impl Into<String>, source: ParamSource, value: Option<ArgValue>) {
        self.slots.push(Slot {
            name: name.into(),
            source,
            value,
        });
    }

    /// Number of arguments, present or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the named argument was bound to a value.
    #[must_use]
    pub fn is_present(&self, name: &str) -> bool {
        self.slot(name).is_some_and(|slot| slot.value.is_some())
    }

    /// Borrows the named argument.
    #[must_use]
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.slot(name)?.value.as_ref()?.as_any().downcast_ref::<T>()
    }

    /// Borrows the named argument, failing if absent or of another type.
    pub fn required<T: Any>(&self, name: &str) -> RestResult<&T> {
        let slot = self
            .slot(name)
            .ok_or_else(|| RestError::illegal_argument(format!("no argument named '{name}'")))?;
        let value = slot
            .value
            .as_ref()
            .ok_or_else(|| RestError::missing_parameter(slot.source, name))?;
        value.as_any().downcast_ref::<T>().ok_or_else(|| {
            RestError::type_mismatch(format!(
                "argument '{name}' is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Moves the named owned argument out.
    pub fn take<T: Any>(&mut self, name: &str) -> RestResult<T> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.name == name)
            .ok_or_else(|| RestError::illegal_argument(format!("no argument named '{name}'")))?;
        match slot.value.take() {
            Some(ArgValue::Owned(value)) => match value.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(value) => {
                    slot.value = Some(ArgValue::Owned(value));
                    Err(RestError::type_mismatch(format!(
                        "argument '{name}' is not a {}",
                        std::any::type_name::<T>()
                    )))
                }
            },
            Some(shared @ ArgValue::Shared(_)) => {
                slot.value = Some(shared);
                Err(RestError::illegal_argument(format!(
                    "argument '{name}' is shared; use `shared` instead"
                )))
            }
            None => Err(RestError::missing_parameter(slot.source, name)),
        }
    }

    /// Moves the body argument out.
    pub fn body<T: Any>(&mut self) -> RestResult<T> {
        let name = self
            .slots
            .iter()
            .find(|slot| slot.source == ParamSource::Body)
            .map(|slot| slot.name.clone())
            .ok_or_else(|| RestError::illegal_argument("route declares no body parameter"))?;
        self.take(&name)
    }

    /// The named argument as a shared reference-counted value.
    #[must_use]
    pub fn shared<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        match self.slot(name)?.value.as_ref()? {
            ArgValue::Shared(value) => Arc::clone(value).downcast::<T>().ok(),
            ArgValue::Owned(_) => None,
        }
    }

    /// The first context argument of type `T`.
    #[must_use]
    pub fn context<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.slots
            .iter()
            .filter(|slot| slot.source == ParamSource::Context)
            .find_map(|slot| match slot.value.as_ref()? {
                ArgValue::Shared(value) => Arc::clone(value).downcast::<T>().ok(),
                ArgValue::Owned(_) => None,
            })
    }

    /// Argument names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.name == name)
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.slots
                    .iter()
                    .map(|slot| (slot.source, &slot.name, slot.value.is_some())),
            )
            .finish()
    }
}
