//! Authenticated principal abstraction.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::RestResult;
use crate::BoxFuture;

/// A principal that can be asked whether it holds a role.
///
/// Each role check is independent and asynchronous; callers compose them.
pub trait User: Send + Sync + 'static {
    /// Principal name.
    fn name(&self) -> &str;

    /// Resolves to `true` if the principal is authorized for `role`.
    fn is_authorized<'a>(&'a self, role: &'a str) -> BoxFuture<'a, RestResult<bool>>;
}

/// A user backed by a fixed set of role names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleUser {
    name: String,
    roles: HashSet<String>,
}

impl RoleUser {
    /// Creates a user with the given roles.
    pub fn new<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the role set contains `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

crate::typed!(RoleUser);

impl User for RoleUser {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_authorized<'a>(&'a self, role: &'a str) -> BoxFuture<'a, RestResult<bool>> {
        let granted = self.has_role(role);
        Box::pin(async move { Ok(granted) })
    }
}

/// The request's authenticated user, whatever its concrete type.
///
/// Declare a context parameter of this type to receive the user installed by
/// a context provider.
#[derive(Clone)]
pub struct CurrentUser(Arc<dyn User>);

impl CurrentUser {
    /// Wraps an installed user.
    #[must_use]
    pub fn new(user: Arc<dyn User>) -> Self {
        Self(user)
    }

    /// The shared principal.
    #[must_use]
    pub fn into_inner(self) -> Arc<dyn User> {
        self.0
    }
}

impl Deref for CurrentUser {
    type Target = dyn User;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CurrentUser").field(&self.0.name()).finish()
    }
}

crate::typed!(CurrentUser);
