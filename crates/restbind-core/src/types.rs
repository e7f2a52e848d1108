//! Declared type tags and the compatibility checker.
//!
//! Rust erases nothing at runtime, but it also has no class hierarchy to walk.
//! Every value and failure that flows through the engine therefore carries an
//! explicit [`TypeDescriptor`]: its own [`TypeTag`] plus the ordered list of
//! tags it may stand in for (closest first). Plugin resolution ranks candidates
//! by the position of their declared target in that list.
//!
//! ```
//! use restbind_core::{typed, Typed, TypeDescriptor};
//!
//! struct Entity;
//! struct Widget;
//! typed!(Entity);
//! typed!(Widget: Entity);
//!
//! let widget = Widget::descriptor();
//! assert!(widget.is_assignable_to(&Entity::descriptor()));
//! assert!(!Entity::descriptor().is_assignable_to(&widget));
//! assert_eq!(widget.distance_to(&Entity::descriptor()), Some(1));
//! ```

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::RestError;

/// Identity of a single Rust type.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Returns the tag of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying [`TypeId`].
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name, as reported by the compiler.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(idx) => &self.name[idx + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Top of every value hierarchy. A plugin declared for `Anything` accepts any value.
#[derive(Debug)]
pub enum Anything {}

/// Top of every failure hierarchy. A plugin declared for `AnyFailure` accepts any cause.
#[derive(Debug)]
pub enum AnyFailure {}

/// Tag used for homogeneous sequences; the element type lives in the descriptor.
#[derive(Debug)]
pub enum Sequence {}

/// A type tag together with everything it may be assigned to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    tag: TypeTag,
    ancestors: Vec<TypeTag>,
    element: Option<Box<TypeDescriptor>>,
    failure: bool,
}

impl TypeDescriptor {
    /// Descriptor of `T` with no declared ancestors.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_tag(TypeTag::of::<T>())
    }

    /// Descriptor built from an existing tag.
    #[must_use]
    pub fn from_tag(tag: TypeTag) -> Self {
        Self {
            tag,
            ancestors: Vec::new(),
            element: None,
            failure: false,
        }
    }

    /// The universal value type.
    #[must_use]
    pub fn anything() -> Self {
        Self::of::<Anything>()
    }

    /// The universal failure type.
    #[must_use]
    pub fn any_failure() -> Self {
        Self::of::<AnyFailure>().failure()
    }

    /// A sequence whose elements are described by `element`.
    #[must_use]
    pub fn sequence_of(element: TypeDescriptor) -> Self {
        Self {
            tag: TypeTag::of::<Sequence>(),
            ancestors: Vec::new(),
            element: Some(Box::new(element)),
            failure: false,
        }
    }

    /// Appends `P` as the next (more general) ancestor.
    #[must_use]
    pub fn extends<P: ?Sized + 'static>(mut self) -> Self {
        let tag = TypeTag::of::<P>();
        if tag != self.tag && !self.ancestors.contains(&tag) {
            self.ancestors.push(tag);
        }
        self
    }

    /// Marks the described type as a failure (assignable to [`AnyFailure`]).
    #[must_use]
    pub fn failure(mut self) -> Self {
        self.failure = true;
        self
    }

    /// The type's own tag.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Declared ancestors, closest first.
    #[must_use]
    pub fn ancestors(&self) -> &[TypeTag] {
        &self.ancestors
    }

    /// Element descriptor for sequences.
    #[must_use]
    pub fn element(&self) -> Option<&TypeDescriptor> {
        self.element.as_deref()
    }

    /// Whether this descriptor names a failure type.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.failure
    }

    /// Whether this is the universal value type.
    #[must_use]
    pub fn is_anything(&self) -> bool {
        self.tag == TypeTag::of::<Anything>()
    }

    /// Number of hierarchy steps from `self` up to `target`, or `None` if a
    /// value of this type cannot be used where `target` is declared.
    ///
    /// Exact matches are `0`; roots rank behind every declared ancestor.
    #[must_use]
    pub fn distance_to(&self, target: &TypeDescriptor) -> Option<usize> {
        let declared = self.ancestors.len();

        if target.is_anything() {
            return Some(if self.is_anything() { 0 } else { declared + 2 });
        }
        if target.tag == TypeTag::of::<AnyFailure>() {
            return match (self.failure, self.tag == target.tag) {
                (_, true) => Some(0),
                (true, false) => Some(declared + 1),
                (false, false) => None,
            };
        }

        if let (Some(own), Some(wanted)) = (&self.element, &target.element) {
            return own.distance_to(wanted);
        }
        if self.element.is_some() != target.element.is_some() {
            return None;
        }

        if self.tag == target.tag {
            return Some(0);
        }
        self.ancestors
            .iter()
            .position(|tag| *tag == target.tag)
            .map(|idx| idx + 1)
    }

    /// Soft check: may a value of this type be used where `target` is declared?
    #[must_use]
    pub fn is_assignable_to(&self, target: &TypeDescriptor) -> bool {
        self.distance_to(target).is_some()
    }

    /// Soft check in both directions, used when either side may be the more general one.
    #[must_use]
    pub fn is_compatible_with(&self, other: &TypeDescriptor) -> bool {
        self.is_assignable_to(other) || other.is_assignable_to(self)
    }

    /// Hard check: fails with [`RestError::TypeMismatch`] carrying `context`.
    pub fn check_assignable_to(
        &self,
        target: &TypeDescriptor,
        context: impl fmt::Display,
    ) -> Result<(), RestError> {
        if self.is_assignable_to(target) {
            Ok(())
        } else {
            Err(RestError::type_mismatch(format!(
                "{context} - type '{self}' is not compatible with '{target}'"
            )))
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element {
            Some(element) => write!(f, "[{element}]"),
            None => write!(f, "{}", self.tag),
        }
    }
}

/// Types that can describe themselves to the engine.
///
/// Implement it with the [`typed!`](crate::typed) macro.
pub trait Typed: std::any::Any + Send + Sync {
    /// The descriptor of `Self`.
    fn descriptor() -> TypeDescriptor
    where
        Self: Sized;
}

/// Implements [`Typed`] for a type, optionally listing its ancestors closest first.
///
/// Prefix the type with `failure` for error types.
///
/// ```
/// use restbind_core::typed;
///
/// #[derive(Debug)]
/// struct Shape;
/// #[derive(Debug)]
/// struct Circle;
/// #[derive(Debug, thiserror::Error)]
/// #[error("no such shape")]
/// struct NoSuchShape;
///
/// typed!(Shape);
/// typed!(Circle: Shape);
/// typed!(failure NoSuchShape);
/// ```
#[macro_export]
macro_rules! typed {
    (failure $ty:ty $(: $($parent:ty),+)?) => {
        impl $crate::Typed for $ty {
            fn descriptor() -> $crate::TypeDescriptor {
                $crate::TypeDescriptor::of::<$ty>()
                    $($(.extends::<$parent>())+)?
                    .failure()
            }
        }
    };
    ($ty:ty $(: $($parent:ty),+)?) => {
        impl $crate::Typed for $ty {
            fn descriptor() -> $crate::TypeDescriptor {
                $crate::TypeDescriptor::of::<$ty>()
                    $($(.extends::<$parent>())+)?
            }
        }
    };
}

typed!(String);
typed!(bool);
typed!(i8);
typed!(i16);
typed!(i32);
typed!(i64);
typed!(u8);
typed!(u16);
typed!(u32);
typed!(u64);
typed!(usize);
typed!(f32);
typed!(f64);
typed!(serde_json::Value);
typed!(bytes::Bytes);

impl Typed for Anything {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::anything()
    }
}

impl Typed for AnyFailure {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::any_failure()
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::sequence_of(T::descriptor())
    }
}
