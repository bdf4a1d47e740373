//! Store: the runtime and container of one root builder
//!
//! `create_store` only prepares the tree; the first snapshot is published
//! by the first [`Store::settle`] (or [`Store::flush`]). Until then the
//! store reads as `Null` at version 0.

use crate::builder::{Builder, BuilderCall};
use crate::config::EngineConfig;
use crate::container::{Container, Snapshot, Subscription};
use crate::context::ContextProvider;
use crate::error::{EngineError, Result};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::runtime::{InstanceInfo, PassOutcome, Runtime};
use crate::scope::{self, Provider};
use crate::selector::Selector;
use arbor_types::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

struct StoreInner {
    runtime: Runtime,
    container: Arc<Container>,
    metrics: Arc<EngineMetrics>,
    config: EngineConfig,
}

/// Handle to a store; clones share the same tree and container
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Create a store for `root` with the default configuration
///
/// `scope` supplies values builders read with `cx.use_context`.
pub fn create_store(root: &Builder, scope: Option<ContextProvider>) -> Store {
    create_store_with_config(root, scope, EngineConfig::default())
}

/// Create a store for `root` with `config`
pub fn create_store_with_config(
    root: &Builder,
    scope: Option<ContextProvider>,
    config: EngineConfig,
) -> Store {
    let metrics = Arc::new(EngineMetrics::new());
    let runtime = Runtime::new(
        BuilderCall::new(root, None),
        scope.unwrap_or_default(),
        config.clone(),
        Arc::clone(&metrics),
    );
    info!(root = root.name(), "created store");
    Store {
        inner: Arc::new(StoreInner {
            runtime,
            container: Arc::new(Container::new()),
            metrics,
            config,
        }),
    }
}

impl Store {
    /// Last committed snapshot
    pub fn get_state(&self) -> Snapshot {
        self.inner.container.get_state()
    }

    /// Number of commits so far
    pub fn version(&self) -> u64 {
        self.inner.container.version()
    }

    /// Register a callback that runs after every commit
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.container.subscribe(callback)
    }

    /// Memoized derived read over this store's snapshots
    pub fn select<O: Clone>(&self, select: impl Fn(&Value) -> O + Send + Sync + 'static) -> Selector<O> {
        Selector::new(
            Arc::clone(&self.inner.container),
            Arc::clone(&self.inner.metrics),
            select,
        )
    }

    /// Like [`select`](Self::select), for code running inside this store's
    /// [`Provider`] scope; fails with [`EngineError::MissingScope`] elsewhere
    pub fn use_selector<O: Clone>(
        &self,
        select: impl Fn(&Value) -> O + Send + Sync + 'static,
    ) -> Result<Selector<O>> {
        if !scope::is_provided(self) {
            return Err(EngineError::MissingScope);
        }
        Ok(self.select(select))
    }

    /// Scoping token that makes this store available to nested code
    pub fn provider(&self) -> Provider {
        Provider::new(self.clone())
    }

    /// Run passes until no work remains; returns the number of commits
    pub fn settle(&self) -> Result<usize> {
        let max_passes = self.inner.config.max_passes;
        let mut commits = 0;
        for _ in 0..max_passes {
            if self.inner.runtime.is_torn_down() {
                return Err(EngineError::TornDown);
            }
            if !self.inner.runtime.has_pending_work() {
                return Ok(commits);
            }
            if self.flush()? {
                commits += 1;
            }
        }

        if self.inner.runtime.has_pending_work() {
            return Err(EngineError::RebuildLimit(max_passes));
        }
        Ok(commits)
    }

    /// Run a single pass; true if it committed a new snapshot
    pub fn flush(&self) -> Result<bool> {
        match self.inner.runtime.run_pass()? {
            Some(outcome) => {
                self.commit(outcome);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn commit(&self, outcome: PassOutcome) {
        let PassOutcome {
            snapshot,
            back_refs,
            invoked,
            unmounted,
        } = outcome;

        self.inner.container.set_state(Arc::new(snapshot));
        self.inner.metrics.record_commit();
        debug!(version = self.version(), invoked, unmounted, "committed snapshot");

        for (action, value) in back_refs {
            action.invoke_with(&[value]);
        }
    }

    /// True if state changes are waiting for a pass
    pub fn has_pending_work(&self) -> bool {
        self.inner.runtime.has_pending_work()
    }

    /// Invocation tree with builder names, or `None` before the first pass
    pub fn inspect(&self) -> Option<InstanceInfo> {
        self.inner.runtime.inspect()
    }

    /// Engine counters so far
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Configuration the store runs with
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Unmount the tree and drop its state and subscribers
    ///
    /// The last snapshot stays readable; later passes fail with
    /// [`EngineError::TornDown`].
    pub fn teardown(&self) -> Result<()> {
        let removed = self.inner.runtime.teardown()?;
        self.inner.container.clear_subscribers();
        info!(removed, "store torn down");
        Ok(())
    }

    /// True if both handles refer to the same store
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("runtime", &self.inner.runtime)
            .field("container", &self.inner.container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_before_first_pass() {
        let store = create_store(&Builder::new("root", |_, _| Ok(Value::from(1))), None);

        assert!(store.get_state().is_null());
        assert_eq!(store.version(), 0);
        assert!(store.has_pending_work());
        assert!(store.inspect().is_none());

        assert_eq!(store.settle().unwrap(), 1);
        assert_eq!(*store.get_state(), Value::from(1));
        assert_eq!(store.version(), 1);
        assert_eq!(store.settle().unwrap(), 0);
    }

    #[test]
    fn test_self_scheduling_builder_hits_limit() {
        let config = EngineConfig {
            max_passes: 3,
            ..EngineConfig::default()
        };
        let restless = Builder::new("restless", |cx, _| {
            let (n, setter) = cx.use_state(|| 0i64);
            setter.set(n + 1);
            Ok(Value::from(n))
        });
        let store = create_store_with_config(&restless, None, config);

        let err = store.settle().unwrap_err();
        assert!(matches!(err, EngineError::RebuildLimit(3)));
        assert_eq!(store.version(), 3);
    }

    #[test]
    fn test_use_selector_requires_scope() {
        let store = create_store(&Builder::new("root", |_, _| Ok(Value::Null)), None);

        assert!(matches!(store.use_selector(|s| s.is_null()), Err(EngineError::MissingScope)));
        let inside = store.provider().scope(|| store.use_selector(|s| s.is_null()).map(|sel| sel.get()));
        assert!(inside.unwrap());
    }
}
