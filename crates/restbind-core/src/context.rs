//! Request-scoped values supplied by context providers.
//!
//! A [`ContextValue`] is stored in [`ContextData`] keyed by its type. Context
//! parameters are satisfied from here, exact type first, then the closest
//! assignable one.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::types::{TypeDescriptor, Typed};
use crate::user::User;

/// A provided value, optionally also acting as the request's user.
#[derive(Clone)]
pub struct ContextValue {
    value: Arc<dyn Any + Send + Sync>,
    descriptor: TypeDescriptor,
    user: Option<Arc<dyn User>>,
}

impl ContextValue {
    /// Wraps a value.
    pub fn new<T: Typed>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Wraps an already shared value.
    pub fn shared<T: Typed>(value: Arc<T>) -> Self {
        Self {
            value,
            descriptor: T::descriptor(),
            user: None,
        }
    }

    /// Wraps a user; it is stored as data and installed as the request's user.
    pub fn user<U: User + Typed>(user: U) -> Self {
        let user = Arc::new(user);
        Self {
            value: user.clone(),
            descriptor: U::descriptor(),
            user: Some(user as Arc<dyn User>),
        }
    }

    /// Runtime type of the value.
    #[must_use]
    pub const fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The value, type-erased.
    #[must_use]
    pub fn value(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.value)
    }

    /// The value as `T`.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// The user carried by this value, if any.
    #[must_use]
    pub fn as_user(&self) -> Option<Arc<dyn User>> {
        self.user.clone()
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextValue")
            .field("type", &self.descriptor.to_string())
            .field("user", &self.user.is_some())
            .finish()
    }
}

/// Per-request store of provided values.
#[derive(Clone, Debug, Default)]
pub struct ContextData {
    entries: Vec<ContextValue>,
}

impl ContextData {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing one of the same type.
    pub fn insert(&mut self, value: ContextValue) {
        let tag = value.descriptor.tag();
        self.entries.retain(|existing| existing.descriptor.tag() != tag);
        self.entries.push(value);
    }

    /// Looks up the value best fitting `wanted`.
    #[must_use]
    pub fn lookup(&self, wanted: &TypeDescriptor) -> Option<&ContextValue> {
        self.entries
            .iter()
            .filter_map(|entry| entry.descriptor.distance_to(wanted).map(|d| (d, entry)))
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, entry)| entry)
    }

    /// Typed lookup by exact type.
    #[must_use]
    pub fn get<T: Typed>(&self) -> Option<Arc<T>> {
        self.lookup(&T::descriptor()).and_then(ContextValue::downcast::<T>)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
