//! Persistent state cells
//!
//! Each invocation owns an ordered list of cells that survives rebuilds of
//! the same identity. Builders reach their cells through [`Cx`], in call
//! order: the n-th `use_state` of a build always reads the n-th cell, so a
//! builder must request its cells in the same order on every build.
//!
//! Setters never touch a cell directly. They queue an update and mark the
//! owning invocation dirty; the runtime applies queued updates at the start
//! of its next pass.

use crate::context::ContextProvider;
use crate::runtime::InstanceId;
use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub(crate) type Cell = Box<dyn Any + Send + Sync>;

type ApplyFn = Box<dyn FnOnce(&mut (dyn Any + Send + Sync)) + Send>;

/// A queued write to one cell
pub(crate) struct CellUpdate {
    pub(crate) instance: InstanceId,
    slot: usize,
    apply: ApplyFn,
}

/// Work queued for the next pass
#[derive(Default)]
pub(crate) struct PendingWork {
    pub(crate) mount: bool,
    pub(crate) dirty: HashSet<InstanceId>,
    pub(crate) updates: Vec<CellUpdate>,
}

impl PendingWork {
    pub(crate) fn is_empty(&self) -> bool {
        !self.mount && self.dirty.is_empty() && self.updates.is_empty()
    }

    /// Put back the marks of a pass that did not complete
    pub(crate) fn requeue(&mut self, dirty: HashSet<InstanceId>, mount: bool) {
        self.mount |= mount;
        self.dirty.extend(dirty);
    }
}

pub(crate) type SharedPending = Arc<Mutex<PendingWork>>;

/// Cells of every mounted invocation, keyed by identity
#[derive(Default)]
pub struct CellRegistry {
    slots: HashMap<InstanceId, Vec<Cell>>,
}

impl CellRegistry {
    /// Number of invocations holding at least one cell
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no instance holds cells
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of cells held by `instance`
    pub fn cell_count(&self, instance: InstanceId) -> usize {
        self.slots.get(&instance).map_or(0, Vec::len)
    }

    /// Borrow the cells of `instance` out of the registry for a build
    pub(crate) fn take(&mut self, instance: InstanceId) -> Vec<Cell> {
        self.slots.remove(&instance).unwrap_or_default()
    }

    /// Return cells taken with [`take`](Self::take)
    pub(crate) fn restore(&mut self, instance: InstanceId, cells: Vec<Cell>) {
        if !cells.is_empty() {
            self.slots.insert(instance, cells);
        }
    }

    /// Drop the cells of an unmounted invocation
    pub(crate) fn remove(&mut self, instance: InstanceId) -> bool {
        self.slots.remove(&instance).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    /// Apply a queued update; false if the cell no longer exists
    pub(crate) fn apply(&mut self, update: CellUpdate) -> bool {
        let CellUpdate {
            instance,
            slot,
            apply,
        } = update;
        match self.slots.get_mut(&instance).and_then(|cells| cells.get_mut(slot)) {
            Some(cell) => {
                apply(&mut **cell);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for CellRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|(id, cells)| (id, cells.len())))
            .finish()
    }
}

/// Build context handed to a builder function
pub struct Cx<'a> {
    instance: InstanceId,
    name: &'a str,
    cells: &'a mut Vec<Cell>,
    cursor: usize,
    pending: &'a SharedPending,
    contexts: &'a ContextProvider,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(
        instance: InstanceId,
        name: &'a str,
        cells: &'a mut Vec<Cell>,
        pending: &'a SharedPending,
        contexts: &'a ContextProvider,
    ) -> Self {
        Self {
            instance,
            name,
            cells,
            cursor: 0,
            pending,
            contexts,
        }
    }

    /// Identity of the invocation being built
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Builder name of the invocation being built
    pub fn name(&self) -> &str {
        self.name
    }

    /// Read the next state cell, creating it with `init` on first build
    ///
    /// Returns the current value and a setter that schedules a rebuild of
    /// this invocation.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> (T, StateSetter<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let slot = self.cursor;
        self.cursor += 1;

        let current = self
            .cells
            .get(slot)
            .and_then(|cell| cell.downcast_ref::<T>())
            .cloned();
        let value = match current {
            Some(value) => value,
            None => {
                let value = init();
                if slot < self.cells.len() {
                    warn!(
                        builder = self.name,
                        slot,
                        expected = type_name::<T>(),
                        "state cell changed type between builds; reinitializing"
                    );
                    self.cells[slot] = Box::new(value.clone());
                } else {
                    self.cells.push(Box::new(value.clone()));
                }
                value
            }
        };

        let setter = StateSetter {
            instance: self.instance,
            slot,
            pending: Arc::downgrade(self.pending),
            _marker: PhantomData,
        };
        (value, setter)
    }

    /// Value of type `T` supplied by the store's context provider
    pub fn use_context<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.contexts.get::<T>()
    }
}

impl fmt::Debug for Cx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("instance", &self.instance)
            .field("name", &self.name)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Handle that schedules writes to one state cell
pub struct StateSetter<T> {
    instance: InstanceId,
    slot: usize,
    pending: Weak<Mutex<PendingWork>>,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance,
            slot: self.slot,
            pending: self.pending.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("instance", &self.instance)
            .field("slot", &self.slot)
            .finish()
    }
}

impl<T: Send + Sync + 'static> StateSetter<T> {
    /// Replace the cell's value on the next pass
    pub fn set(&self, value: T) {
        self.enqueue(move |cell| *cell = value);
    }

    /// Derive the cell's next value from its value at the time the update applies
    pub fn update(&self, f: impl FnOnce(&T) -> T + Send + 'static) {
        self.enqueue(move |cell| *cell = f(cell));
    }

    fn enqueue(&self, write: impl FnOnce(&mut T) + Send + 'static) {
        let Some(pending) = self.pending.upgrade() else {
            debug!(instance = %self.instance, "store is gone; dropping state update");
            return;
        };
        let apply: ApplyFn = Box::new(move |cell| match cell.downcast_mut::<T>() {
            Some(value) => write(value),
            None => warn!(expected = type_name::<T>(), "state update does not match cell type"),
        });

        let mut pending = pending.lock();
        pending.updates.push(CellUpdate {
            instance: self.instance,
            slot: self.slot,
            apply,
        });
        pending.dirty.insert(self.instance);
    }
}
