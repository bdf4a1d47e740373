//! Opaque embedded-computation markers
//!
//! A marker is any `Embedding` implementor placed inside a [`Value`]. The
//! value layer never looks inside: it only needs to recognise the leaf and
//! share it by reference when structures are copied.
//!
//! [`Value`]: crate::Value

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A computation whose resolved value belongs at the marker's position
pub trait Embedding: Send + Sync + 'static {
    /// Declared name of the computation, for diagnostics
    fn name(&self) -> &str;

    /// Upcast used by the engine to recover its concrete marker type
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared handle to an embedded computation
#[derive(Clone)]
pub struct EmbeddedRef(Arc<dyn Embedding>);

impl EmbeddedRef {
    pub fn new<E: Embedding>(embedding: E) -> Self {
        Self(Arc::new(embedding))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Recover the concrete marker type, if it matches
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.0.clone().into_any().downcast::<T>().ok()
    }

    /// Whether both handles point at the same marker
    pub fn ptr_eq(&self, other: &EmbeddedRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EmbeddedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Embedded({})", self.name())
    }
}

impl PartialEq for EmbeddedRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
