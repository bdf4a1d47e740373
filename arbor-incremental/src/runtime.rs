//! In-process recomputation runtime
//!
//! Owns the invocation tree of a store. Every node is one builder
//! invocation, identified under its parent by `(builder name, key,
//! occurrence)`, and keeps the raw structure of its last build together
//! with the snapshot resolved from it.
//!
//! A pass walks the tree from the root:
//!
//! - dirty invocations, and every invocation under one that was re-invoked,
//!   run their builder again;
//! - a clean invocation with a changed descendant is cloned again from its
//!   retained raw structure and refilled with its children's snapshots;
//! - a clean subtree with no changes keeps its snapshot.
//!
//! Children that no longer appear in a rebuilt structure are unmounted and
//! their state cells dropped.

use crate::builder::{BuilderCall, Expansion};
use crate::cells::{CellRegistry, Cx, PendingWork, SharedPending};
use crate::config::EngineConfig;
use crate::context::ContextProvider;
use crate::error::{EngineError, Result};
use crate::instance::Instance;
use crate::metrics::EngineMetrics;
use arbor_types::{Action, EmbeddedRef, Value};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, warn};

/// Stable handle of one mounted invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What distinguishes an invocation from its siblings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Identity {
    name: String,
    key: String,
    occurrence: usize,
}

impl Identity {
    fn of(call: &BuilderCall, occurrence: usize) -> Self {
        Self {
            name: call.name().to_string(),
            key: call.key().to_string(),
            occurrence,
        }
    }
}

struct Node {
    identity: Identity,
    call: Arc<BuilderCall>,
    raw: Value,
    children: Vec<InstanceId>,
    snapshot: Value,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<InstanceId, Node>,
    cells: CellRegistry,
    root: Option<InstanceId>,
    next_id: u64,
}

impl Tree {
    fn allocate(&mut self) -> InstanceId {
        self.next_id += 1;
        InstanceId(self.next_id)
    }

    fn snapshot_of(&self, id: InstanceId) -> Result<Value> {
        self.nodes
            .get(&id)
            .map(|node| node.snapshot.clone())
            .ok_or(EngineError::NotMounted(id))
    }
}

/// A child invocation matched to its place in the tree
struct Incoming {
    identity: Identity,
    call: Arc<BuilderCall>,
}

#[derive(Default)]
struct Pass {
    dirty: HashSet<InstanceId>,
    invoked: usize,
    refilled: usize,
    unmounted: usize,
    back_refs: Vec<(Action, Value)>,
}

/// Result of a pass that changed the root snapshot
#[derive(Debug)]
pub struct PassOutcome {
    /// The new root snapshot
    pub snapshot: Value,
    /// `ref` actions to call with their invocation's new snapshot, after commit
    pub back_refs: Vec<(Action, Value)>,
    /// Builder invocations run
    pub invoked: usize,
    /// Invocations unmounted
    pub unmounted: usize,
}

/// Diagnostic view of one mounted invocation
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    /// Instance id
    pub id: InstanceId,
    /// Declared builder name
    pub name: String,
    /// Identity key
    pub key: String,
    /// Position among siblings sharing name and key
    pub occurrence: usize,
    /// State cells held
    pub cells: usize,
    /// Identity props (without the back-reference)
    pub props: Value,
    /// Mounted children in discovery order
    pub children: Vec<InstanceInfo>,
}

/// The invocation tree of one store and the passes that keep it current
pub struct Runtime {
    tree: Mutex<Tree>,
    root: Arc<BuilderCall>,
    pending: SharedPending,
    contexts: ContextProvider,
    config: EngineConfig,
    metrics: Arc<EngineMetrics>,
    passes: AtomicU64,
    torn_down: AtomicBool,
}

impl Runtime {
    /// Create a runtime whose first pass mounts `root`
    pub fn new(
        root: BuilderCall,
        contexts: ContextProvider,
        config: EngineConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let pending = PendingWork {
            mount: true,
            ..PendingWork::default()
        };
        Self {
            tree: Mutex::new(Tree::default()),
            root: Arc::new(root),
            pending: Arc::new(Mutex::new(pending)),
            contexts,
            config,
            metrics,
            passes: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    /// True if a pass would have something to do
    pub fn has_pending_work(&self) -> bool {
        !self.is_torn_down() && !self.pending.lock().is_empty()
    }

    /// True after [`teardown`](Self::teardown)
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Run one recomputation pass
    ///
    /// Returns `None` when the pass left the root snapshot unchanged. On
    /// error nothing is published and the pass's work is queued again.
    pub fn run_pass(&self) -> Result<Option<PassOutcome>> {
        if self.is_torn_down() {
            return Err(EngineError::TornDown);
        }
        let Some(mut tree) = self.tree.try_lock() else {
            return Err(EngineError::PassInProgress);
        };

        let work = std::mem::take(&mut *self.pending.lock());
        if work.is_empty() {
            return Ok(None);
        }
        let PendingWork {
            mount,
            dirty,
            updates,
        } = work;

        let number = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        let _span = debug_span!("pass", number).entered();
        debug!(mount, dirty = dirty.len(), updates = updates.len(), "starting pass");

        for update in updates {
            let instance = update.instance;
            if !tree.cells.apply(update) {
                warn!(%instance, "dropping state update for unmounted instance");
            }
        }

        let root_id = match tree.root {
            Some(id) => id,
            None => {
                let id = tree.allocate();
                tree.root = Some(id);
                id
            }
        };
        let incoming = (mount || !tree.nodes.contains_key(&root_id)).then(|| Incoming {
            identity: Identity::of(&self.root, 0),
            call: Arc::clone(&self.root),
        });

        let mut pass = Pass {
            dirty: dirty.clone(),
            ..Pass::default()
        };
        let changed = match self.reconcile(&mut tree, &mut pass, root_id, incoming) {
            Ok(changed) => changed,
            Err(err) => {
                warn!(error = %err, "pass failed; keeping last snapshot");
                self.pending.lock().requeue(dirty, mount);
                return Err(err);
            }
        };

        debug!(
            invoked = pass.invoked,
            refilled = pass.refilled,
            unmounted = pass.unmounted,
            changed,
            "pass finished"
        );
        if !changed {
            return Ok(None);
        }

        Ok(Some(PassOutcome {
            snapshot: tree.snapshot_of(root_id)?,
            back_refs: pass.back_refs,
            invoked: pass.invoked,
            unmounted: pass.unmounted,
        }))
    }

    /// Bring `id` up to date; true if its snapshot changed
    fn reconcile(
        &self,
        tree: &mut Tree,
        pass: &mut Pass,
        id: InstanceId,
        incoming: Option<Incoming>,
    ) -> Result<bool> {
        if let Some(incoming) = incoming {
            return self.invoke(tree, pass, id, incoming);
        }
        if pass.dirty.contains(&id) {
            let node = tree.nodes.get(&id).ok_or(EngineError::NotMounted(id))?;
            let incoming = Incoming {
                identity: node.identity.clone(),
                call: Arc::clone(&node.call),
            };
            return self.invoke(tree, pass, id, incoming);
        }
        self.refresh(tree, pass, id)
    }

    /// Rebuild a clean invocation from its retained raw structure if a child changed
    fn refresh(&self, tree: &mut Tree, pass: &mut Pass, id: InstanceId) -> Result<bool> {
        let children = tree
            .nodes
            .get(&id)
            .map(|node| node.children.clone())
            .ok_or(EngineError::NotMounted(id))?;

        let mut changed = false;
        for &child in &children {
            changed |= self.reconcile(tree, pass, child, None)?;
        }
        if !changed {
            self.metrics.record_reuse();
            return Ok(false);
        }

        let node = tree.nodes.get(&id).ok_or(EngineError::NotMounted(id))?;
        let mut instance = Instance::create(
            node.identity.name.as_str(),
            &node.raw,
            children.len(),
            self.config.overrun,
        );
        for &child in &children {
            instance.append_child(tree.snapshot_of(child)?)?;
        }
        let snapshot = instance.finish()?;
        self.metrics.record_refill();
        pass.refilled += 1;

        if let Some(node) = tree.nodes.get_mut(&id) {
            if let Some(action) = node.call.back_reference() {
                pass.back_refs.push((action.clone(), snapshot.clone()));
            }
            node.snapshot = snapshot;
        }
        Ok(true)
    }

    /// Run the builder of `id` and rebuild every child under it
    fn invoke(&self, tree: &mut Tree, pass: &mut Pass, id: InstanceId, incoming: Incoming) -> Result<bool> {
        let Incoming { identity, call } = incoming;
        debug!(instance = %id, builder = call.name(), key = call.key(), "invoking builder");

        let Expansion { raw, children } = self.expand(tree, pass, id, &call)?;
        let previous = tree
            .nodes
            .get(&id)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        let (matched, fresh) = self.match_children(tree, &call, &children, &previous)?;

        let snapshot = match self.build_children(tree, pass, &call, &raw, &matched) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                for child in fresh {
                    Self::remove_subtree(tree, child);
                }
                return Err(err);
            }
        };

        let kept: HashSet<InstanceId> = matched.iter().map(|(child, _)| *child).collect();
        for stale in previous.into_iter().filter(|child| !kept.contains(child)) {
            let removed = Self::remove_subtree(tree, stale);
            for _ in 0..removed {
                self.metrics.record_unmount();
            }
            pass.unmounted += removed;
        }

        if let Some(action) = call.back_reference() {
            pass.back_refs.push((action.clone(), snapshot.clone()));
        }
        tree.nodes.insert(
            id,
            Node {
                identity,
                call,
                raw,
                children: matched.into_iter().map(|(child, _)| child).collect(),
                snapshot,
            },
        );
        Ok(true)
    }

    fn expand(&self, tree: &mut Tree, pass: &mut Pass, id: InstanceId, call: &BuilderCall) -> Result<Expansion> {
        let started = Instant::now();
        let mut cells = tree.cells.take(id);
        let expansion = {
            let mut cx = Cx::new(id, call.name(), &mut cells, &self.pending, &self.contexts);
            call.expand(&mut cx)
        };
        tree.cells.restore(id, cells);
        self.metrics.record_build(started.elapsed());
        pass.invoked += 1;
        expansion
    }

    /// Pair each discovered marker with an existing child or a new identity
    fn match_children(
        &self,
        tree: &mut Tree,
        parent: &BuilderCall,
        markers: &[EmbeddedRef],
        previous: &[InstanceId],
    ) -> Result<(Vec<(InstanceId, Incoming)>, Vec<InstanceId>)> {
        let mut existing: HashMap<Identity, InstanceId> = previous
            .iter()
            .filter_map(|&child| tree.nodes.get(&child).map(|node| (node.identity.clone(), child)))
            .collect();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        let mut matched = Vec::with_capacity(markers.len());
        let mut fresh = Vec::new();

        for marker in markers {
            let call = marker
                .downcast::<BuilderCall>()
                .ok_or_else(|| EngineError::UnknownEmbedding {
                    name: marker.name().to_string(),
                })?;

            let occurrence = seen
                .entry((call.name().to_string(), call.key().to_string()))
                .or_insert(0);
            if *occurrence > 0 && self.config.warn_duplicate_keys {
                warn!(
                    parent = parent.name(),
                    builder = call.name(),
                    key = call.key(),
                    occurrence = *occurrence,
                    "siblings share a builder and key; matching them by position"
                );
            }
            let identity = Identity::of(&call, *occurrence);
            *occurrence += 1;

            let child = match existing.remove(&identity) {
                Some(child) => child,
                None => {
                    let child = tree.allocate();
                    fresh.push(child);
                    child
                }
            };
            matched.push((child, Incoming { identity, call }));
        }
        Ok((matched, fresh))
    }

    /// Rebuild the matched children and fill their snapshots into a clone of `raw`
    fn build_children(
        &self,
        tree: &mut Tree,
        pass: &mut Pass,
        call: &BuilderCall,
        raw: &Value,
        matched: &[(InstanceId, Incoming)],
    ) -> Result<Value> {
        let mut instance = Instance::create(call.name(), raw, matched.len(), self.config.overrun);
        for (child, incoming) in matched {
            let incoming = Incoming {
                identity: incoming.identity.clone(),
                call: Arc::clone(&incoming.call),
            };
            self.reconcile(tree, pass, *child, Some(incoming))?;
            instance.append_child(tree.snapshot_of(*child)?)?;
        }
        instance.finish()
    }

    /// Remove `id` and its descendants with their cells; returns how many nodes went away
    fn remove_subtree(tree: &mut Tree, id: InstanceId) -> usize {
        tree.cells.remove(id);
        let Some(node) = tree.nodes.remove(&id) else {
            return 0;
        };
        debug!(instance = %id, builder = node.identity.name.as_str(), "unmounting");
        1 + node
            .children
            .iter()
            .map(|&child| Self::remove_subtree(tree, child))
            .sum::<usize>()
    }

    /// Snapshot of the invocation tree, or `None` before the first mount or during a pass
    pub fn inspect(&self) -> Option<InstanceInfo> {
        let tree = self.tree.try_lock()?;
        let root = tree.root?;
        Self::describe(&tree, root)
    }

    fn describe(tree: &Tree, id: InstanceId) -> Option<InstanceInfo> {
        let node = tree.nodes.get(&id)?;
        Some(InstanceInfo {
            id,
            name: node.identity.name.clone(),
            key: node.identity.key.clone(),
            occurrence: node.identity.occurrence,
            cells: tree.cells.cell_count(id),
            props: Value::Mapping(node.call.identity_props().clone()),
            children: node
                .children
                .iter()
                .filter_map(|&child| Self::describe(tree, child))
                .collect(),
        })
    }

    /// Unmount everything and refuse further passes
    pub fn teardown(&self) -> Result<usize> {
        let Some(mut tree) = self.tree.try_lock() else {
            return Err(EngineError::PassInProgress);
        };
        self.torn_down.store(true, Ordering::Release);

        let removed = tree.nodes.len();
        tree.nodes.clear();
        tree.cells.clear();
        tree.root = None;
        *self.pending.lock() = PendingWork::default();

        debug!(removed, "runtime torn down");
        Ok(removed)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("root", &self.root.name())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
