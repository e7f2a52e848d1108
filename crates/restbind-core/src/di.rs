//! Injection container used to construct plugins.
//!
//! Services are registered once at startup. Plugins registered by type rather
//! than by instance implement [`Construct`] and pull their dependencies from the
//! container each time they are resolved.
//!
//! ```rust
//! use restbind_core::di::{Construct, Container};
//! use restbind_core::RestError;
//! use std::sync::Arc;
//!
//! struct Clock { offset: i64 }
//!
//! struct AuditWriter { clock: Arc<Clock> }
//!
//! impl Construct for AuditWriter {
//!     fn construct(container: &Container) -> Result<Self, RestError> {
//!         Ok(Self { clock: container.resolve_required()? })
//!     }
//! }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Clock { offset: 3 }));
//!
//! let writer: AuditWriter = container.construct().unwrap();
//! assert_eq!(writer.clock.offset, 3);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RestError;

/// Types the container knows how to build.
pub trait Construct: Sized {
    /// Builds an instance, resolving dependencies from `container`.
    fn construct(container: &Container) -> Result<Self, RestError>;
}

/// A dependency container keyed by type.
///
/// The container is `Send + Sync` and is shared read-only once serving starts.
#[derive(Default)]
pub struct Container {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Registers a service, replacing any previous one of the same type.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    /// Resolves a service.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|s| s.clone().downcast::<T>().ok())
    }

    /// Resolves a service or fails with [`RestError::PluginConstructionFailed`].
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, RestError> {
        self.resolve().ok_or_else(|| {
            RestError::plugin_construction(std::any::type_name::<T>(), "service not registered")
        })
    }

    /// Constructs `T`, tagging any failure with `T`'s name.
    pub fn construct<T: Construct>(&self) -> Result<T, RestError> {
        T::construct(self).map_err(|e| match e {
            RestError::PluginConstructionFailed { .. } => e,
            other => RestError::plugin_construction(std::any::type_name::<T>(), other.to_string()),
        })
    }

    /// Whether a service of type `T` is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Greeting(String);

    struct Greeter {
        greeting: Arc<Greeting>,
    }

    impl Construct for Greeter {
        fn construct(container: &Container) -> Result<Self, RestError> {
            Ok(Self {
                greeting: container.resolve_required()?,
            })
        }
    }

    struct Fussy;

    impl Construct for Fussy {
        fn construct(_: &Container) -> Result<Self, RestError> {
            Err(RestError::illegal_argument("not today"))
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut container = Container::new();
        assert!(container.is_empty());
        container.register(Arc::new(Greeting("hello".into())));
        assert!(container.contains::<Greeting>());
        assert_eq!(container.len(), 1);
        assert_eq!(container.resolve::<Greeting>().unwrap().0, "hello");
    }

    #[test]
    fn test_construct_resolves_dependencies() {
        let mut container = Container::new();
        container.register(Arc::new(Greeting("hi".into())));
        let greeter: Greeter = container.construct().unwrap();
        assert_eq!(greeter.greeting.0, "hi");
    }

    #[test]
    fn test_missing_dependency_is_construction_failure() {
        let container = Container::new();
        let err = container.construct::<Greeter>().err().unwrap();
        assert!(matches!(err, RestError::PluginConstructionFailed { .. }));
        assert!(err.to_string().contains("Greeting"));
    }

    #[test]
    fn test_other_failures_are_wrapped() {
        let err = Container::new().construct::<Fussy>().err().unwrap();
        match err {
            RestError::PluginConstructionFailed { plugin, reason } => {
                assert!(plugin.contains("Fussy"));
                assert_eq!(reason, "not today");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_debug_reports_count() {
        let debug = format!("{:?}", Container::new());
        assert!(debug.contains("service_count"));
    }
}
