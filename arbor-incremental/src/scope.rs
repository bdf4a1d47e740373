//! Store scoping
//!
//! [`Provider::scope`] makes a store reachable from nested code on the
//! current thread without passing it along explicitly. Scopes nest; the
//! innermost store wins.

use crate::error::{EngineError, Result};
use crate::selector::Selector;
use crate::store::Store;
use arbor_types::Value;
use std::cell::RefCell;

thread_local! {
    /// Stores provided on this thread, innermost last
    static SCOPE: RefCell<Vec<Store>> = const { RefCell::new(Vec::new()) };
}

/// Pops the scope entry even if the scoped closure panics
struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Scoping token for one store
#[derive(Debug, Clone)]
pub struct Provider {
    store: Store,
}

impl Provider {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// The provided store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run `f` with this provider's store in scope
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        SCOPE.with(|stack| stack.borrow_mut().push(self.store.clone()));
        let _guard = ScopeGuard;
        f()
    }
}

/// Innermost store in scope
pub fn current_store() -> Result<Store> {
    SCOPE
        .with(|stack| stack.borrow().last().cloned())
        .ok_or(EngineError::MissingScope)
}

/// Memoized selector over the innermost store in scope
pub fn use_selector<O: Clone>(select: impl Fn(&Value) -> O + Send + Sync + 'static) -> Result<Selector<O>> {
    Ok(current_store()?.select(select))
}

/// True if `store` is provided anywhere in the current scope chain
pub(crate) fn is_provided(store: &Store) -> bool {
    SCOPE.with(|stack| stack.borrow().iter().any(|provided| provided.ptr_eq(store)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::store::create_store;

    fn store(name: &'static str) -> Store {
        create_store(&Builder::new(name, move |_, _| Ok(Value::from(name))), None)
    }

    #[test]
    fn test_no_scope_is_missing() {
        let err = current_store().unwrap_err();
        assert!(matches!(err, EngineError::MissingScope));
        assert_eq!(err.to_string(), "Store is not provided.");
    }

    #[test]
    fn test_nested_scopes_resolve_innermost() {
        let outer = store("outer");
        let inner = store("inner");

        outer.provider().scope(|| {
            assert!(current_store().unwrap().ptr_eq(&outer));
            inner.provider().scope(|| {
                assert!(current_store().unwrap().ptr_eq(&inner));
                assert!(is_provided(&outer));
            });
            assert!(current_store().unwrap().ptr_eq(&outer));
            assert!(!is_provided(&inner));
        });
        assert!(current_store().is_err());
    }

    #[test]
    fn test_scope_is_popped_after_panic() {
        let store = store("panicky");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.provider().scope(|| panic!("builder blew up"));
        }));

        assert!(result.is_err());
        assert!(current_store().is_err());
    }
}
