//! Typed values shared with every builder of a store

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Wraps the root invocation with values its builders can look up by type
#[derive(Clone, Default)]
pub struct ContextProvider {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ContextProvider {
    /// An empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply `value`, replacing any earlier value of the same type
    pub fn provide<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    /// Look up the value of type `T`
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Number of provided values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing is provided
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextProvider")
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provide_replaces_same_type() {
        let contexts = ContextProvider::new()
            .provide(String::from("first"))
            .provide(42u32)
            .provide(String::from("second"));

        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts.get::<String>().as_deref().map(String::as_str), Some("second"));
        assert_eq!(contexts.get::<u32>().as_deref(), Some(&42));
        assert!(contexts.get::<i64>().is_none());
    }
}
