//! State shared by every dispatch stage of one [`RestRouter`](crate::RestRouter).

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use restbind_core::{Container, Validator};
use restbind_extract::Registry;

/// Plugin registry, injection container and validator, behind read-mostly locks.
///
/// Writes happen while routes are being registered; request handling only reads.
pub struct Engine {
    registry: RwLock<Registry>,
    container: RwLock<Arc<Container>>,
    validator: RwLock<Option<Arc<dyn Validator>>>,
}

impl Engine {
    /// Engine over `registry` with an empty container and no validator.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: RwLock::new(registry),
            container: RwLock::new(Arc::new(Container::new())),
            validator: RwLock::new(None),
        }
    }

    /// Read access to the plugin registry.
    pub fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read()
    }

    /// Write access to the plugin registry.
    pub fn registry_mut(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write()
    }

    /// Current injection container.
    pub fn container(&self) -> Arc<Container> {
        Arc::clone(&self.container.read())
    }

    /// Replaces the injection container.
    pub fn set_container(&self, container: Container) {
        *self.container.write() = Arc::new(container);
    }

    /// Current validator, if any.
    pub fn validator(&self) -> Option<Arc<dyn Validator>> {
        self.validator.read().clone()
    }

    /// Installs a validator.
    pub fn set_validator(&self, validator: Arc<dyn Validator>) {
        *self.validator.write() = Some(validator);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Registry::with_defaults())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry.read().state())
            .field("container", &self.container.read().len())
            .field("validator", &self.validator.read().is_some())
            .finish()
    }
}
