//! Ephemeral properties: in-process scratch space attached to a context.
//!
//! Properties never cross the wire. They are stored next to the headers but
//! in a separate map, so nothing that serializes headers can pick them up.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::sync::Arc;

/// A shared, type-erased property value.
///
/// Cloning a context copies the property map but shares the values.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Key under which an ephemeral property is stored.
///
/// Keys are not restricted to strings: integer ids and Rust type identities
/// are also supported, the latter for the common "one value per type" case
/// (for example attaching a tracing span).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// A named key.
    Name(Cow<'static, str>),
    /// A numeric key.
    Id(u64),
    /// A key identifying a Rust type.
    Type(TypeId),
}

impl PropertyKey {
    /// The key identifying values of type `T`.
    pub fn of<T: Any>() -> Self {
        Self::Type(TypeId::of::<T>())
    }
}

impl From<&'static str> for PropertyKey {
    fn from(name: &'static str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

impl From<u64> for PropertyKey {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<TypeId> for PropertyKey {
    fn from(type_id: TypeId) -> Self {
        Self::Type(type_id)
    }
}
