//! Structural clone and positional filler
//!
//! [`clone_structure`] copies a raw structure so that embedded results can
//! be written into the copy without touching the original. [`Filler`] then
//! writes those results, one per call, into the slots the markers occupied.

use crate::discovery::{display_path, slot_paths, Segment, SlotPath};
use arbor_types::Value;
use std::collections::VecDeque;
use tracing::trace;

/// Deep-copy a raw structure
///
/// Containers are rebuilt element by element. Scalars, timestamps, actions
/// and embedded markers are leaves; markers and actions stay shared with
/// the original.
pub fn clone_structure(value: &Value) -> Value {
    match value {
        Value::Sequence(items) => Value::Sequence(items.iter().map(clone_structure).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.iter()
                .map(|(key, item)| (key.clone(), clone_structure(item)))
                .collect(),
        ),
        Value::Timestamp(at) => Value::Timestamp(*at),
        Value::Embedded(marker) => Value::Embedded(marker.clone()),
        Value::Action(action) => Value::Action(action.clone()),
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::Int(n) => Value::Int(*n),
        Value::Float(n) => Value::Float(*n),
        Value::String(s) => Value::String(s.clone()),
    }
}

/// Result of a single [`Filler::fill`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The value was written into the next slot
    Filled,
    /// Every slot was already filled; nothing was written
    Overrun,
    /// The next slot does not exist in `target`; nothing was written
    Missing,
}

/// Writes values into the embedded slots of a clone, in discovery order
///
/// Built from the clone itself, so the slot order is the one
/// [`discover`](crate::discovery::discover) reports for the same structure.
#[derive(Debug, Clone)]
pub struct Filler {
    pending: VecDeque<SlotPath>,
    capacity: usize,
}

impl Filler {
    /// Record the slots of every embedded marker in `clone`
    pub fn new(clone: &Value) -> Self {
        let pending: VecDeque<SlotPath> = slot_paths(clone).into();
        let capacity = pending.len();
        Self { pending, capacity }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not yet filled
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Overwrite the next pending slot of `target` with `replacement`
    ///
    /// `target` must be the clone this filler was built from. Calls past the
    /// last slot leave `target` untouched and report [`FillOutcome::Overrun`];
    /// a slot that `target` lacks is consumed and reported as
    /// [`FillOutcome::Missing`].
    pub fn fill(&mut self, target: &mut Value, replacement: Value) -> FillOutcome {
        let Some(path) = self.pending.pop_front() else {
            return FillOutcome::Overrun;
        };
        trace!(slot = %display_path(&path), kind = replacement.kind(), "filling embedded slot");
        match slot_mut(target, &path) {
            Some(slot) => {
                *slot = replacement;
                FillOutcome::Filled
            }
            None => FillOutcome::Missing,
        }
    }
}

fn slot_mut<'a>(root: &'a mut Value, path: &[Segment]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |current, segment| match (current, segment) {
        (Value::Sequence(items), Segment::Index(i)) => items.get_mut(*i),
        (Value::Mapping(map), Segment::Key(key)) => map.get_mut(key),
        _ => None,
    })
}
