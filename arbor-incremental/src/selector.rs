//! Version-gated memoized reads
//!
//! A selector caches its last result next to the container version it was
//! computed from, and only runs again once the version moves.

use crate::container::{Container, Subscription};
use crate::metrics::EngineMetrics;
use arbor_types::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type SelectFn<O> = dyn Fn(&Value) -> O + Send + Sync;

/// A derived read over a store's snapshot
pub struct Selector<O> {
    container: Arc<Container>,
    select: Box<SelectFn<O>>,
    memo: Mutex<Option<(u64, O)>>,
    metrics: Arc<EngineMetrics>,
}

impl<O: Clone> Selector<O> {
    pub(crate) fn new(
        container: Arc<Container>,
        metrics: Arc<EngineMetrics>,
        select: impl Fn(&Value) -> O + Send + Sync + 'static,
    ) -> Self {
        Self {
            container,
            select: Box::new(select),
            memo: Mutex::new(None),
            metrics,
        }
    }

    /// Current derived value
    ///
    /// Runs the selector on the first read and after each commit; otherwise
    /// returns the cached result.
    pub fn get(&self) -> O {
        let (version, snapshot) = self.container.current();
        if let Some((observed, value)) = self.memo.lock().as_ref() {
            if *observed == version {
                self.metrics.record_selector_hit();
                return value.clone();
            }
        }

        // The selector may read this selector again; run it unlocked
        self.metrics.record_selector_miss();
        let value = (self.select)(&snapshot);
        *self.memo.lock() = Some((version, value.clone()));
        value
    }

    /// Version the cached value was computed from
    pub fn observed_version(&self) -> Option<u64> {
        self.memo.lock().as_ref().map(|(version, _)| *version)
    }

    /// Be told when the underlying snapshot may have changed; re-read with [`get`](Self::get)
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.container.subscribe(callback)
    }
}

impl<O> fmt::Debug for Selector<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("version", &self.container.version())
            .finish()
    }
}
