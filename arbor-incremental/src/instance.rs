//! Instance lifecycle adapter
//!
//! Runs once per build of an invocation: the raw structure is cloned, and
//! the clone collects child snapshots until every embedded slot is written.

use crate::clone::{clone_structure, FillOutcome, Filler};
use crate::config::OverrunPolicy;
use crate::error::{EngineError, Result};
use arbor_types::Value;
use tracing::{debug, trace};

/// Bookkeeping for an instance whose children have not all reported in
#[derive(Debug, Clone)]
pub struct InstanceState {
    filler: Filler,
    /// Embedded children expected
    pub total: usize,
    /// Embedded children written so far
    pub filled: usize,
}

/// An in-progress clone of one invocation's raw structure
#[derive(Debug)]
pub struct Instance {
    name: String,
    value: Value,
    total: usize,
    state: Option<InstanceState>,
    policy: OverrunPolicy,
}

impl Instance {
    /// Clone `raw` and expect `total` embedded children
    ///
    /// With `total == 0` the instance is complete immediately.
    pub fn create(name: impl Into<String>, raw: &Value, total: usize, policy: OverrunPolicy) -> Self {
        let value = clone_structure(raw);
        let state = (total > 0).then(|| InstanceState {
            filler: Filler::new(&value),
            total,
            filled: 0,
        });
        Self {
            name: name.into(),
            value,
            total,
            state,
            policy,
        }
    }

    /// Write the next child's snapshot into its slot
    pub fn append_child(&mut self, child: Value) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            return self.overrun(self.total);
        };

        match state.filler.fill(&mut self.value, child) {
            FillOutcome::Filled => {}
            FillOutcome::Overrun => {
                let capacity = state.filler.capacity();
                return self.overrun(capacity);
            }
            FillOutcome::Missing => {
                return Err(EngineError::MissingSlot {
                    name: self.name.clone(),
                    position: state.filled,
                })
            }
        }
        state.filled += 1;
        trace!(instance = %self.name, filled = state.filled, total = state.total, "child reported");

        if state.filled == state.total {
            self.state = None;
        }
        Ok(())
    }

    fn overrun(&self, capacity: usize) -> Result<()> {
        match self.policy {
            OverrunPolicy::Error => Err(EngineError::FillerOverrun { capacity }),
            OverrunPolicy::Ignore => {
                debug!(instance = %self.name, capacity, "ignoring extra child value");
                Ok(())
            }
        }
    }

    /// True once every expected child was written
    pub fn is_complete(&self) -> bool {
        self.state.is_none()
    }

    /// Children not yet written
    pub fn pending(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.total - s.filled)
    }

    /// Fill progress; `None` once complete
    pub fn state(&self) -> Option<&InstanceState> {
        self.state.as_ref()
    }

    /// The clone as filled so far
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Take the completed snapshot
    pub fn finish(self) -> Result<Value> {
        match self.state {
            None => Ok(self.value),
            Some(state) => Err(EngineError::IncompleteInstance {
                name: self.name,
                filled: state.filled,
                total: state.total,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::{EmbeddedRef, Embedding};
    use std::any::Any;
    use std::sync::Arc;

    struct Slot;

    impl Embedding for Slot {
        fn name(&self) -> &str {
            "slot"
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn slot() -> Value {
        Value::Embedded(EmbeddedRef::new(Slot))
    }

    #[test]
    fn test_no_children_completes_immediately() {
        let raw = Value::mapping([("count", 0)]);
        let instance = Instance::create("counter", &raw, 0, OverrunPolicy::Error);

        assert!(instance.is_complete());
        assert!(instance.state().is_none());
        assert_eq!(instance.finish().unwrap(), raw);
    }

    #[test]
    fn test_children_fill_and_discard_state() {
        let raw = Value::mapping([("a", slot()), ("b", Value::sequence([slot()]))]);
        let mut instance = Instance::create("pair", &raw, 2, OverrunPolicy::Error);

        instance.append_child(Value::from(1)).unwrap();
        assert_eq!(instance.pending(), 1);
        assert_eq!(instance.state().map(|s| s.filled), Some(1));

        instance.append_child(Value::from(2)).unwrap();
        assert!(instance.is_complete());
        assert_eq!(
            instance.finish().unwrap(),
            Value::from(serde_json::json!({ "a": 1, "b": [2] }))
        );
        assert!(raw.get("a").unwrap().is_embedded());
    }

    #[test]
    fn test_finish_before_complete_fails() {
        let raw = Value::sequence([slot(), slot()]);
        let mut instance = Instance::create("list", &raw, 2, OverrunPolicy::Error);
        instance.append_child(Value::Null).unwrap();

        let err = instance.finish().unwrap_err();
        assert!(matches!(err, EngineError::IncompleteInstance { filled: 1, total: 2, .. }));
    }

    #[test]
    fn test_overrun_policy() {
        let raw = Value::sequence([slot()]);

        let mut strict = Instance::create("strict", &raw, 1, OverrunPolicy::Error);
        strict.append_child(Value::from(1)).unwrap();
        let err = strict.append_child(Value::from(2)).unwrap_err();
        assert!(matches!(err, EngineError::FillerOverrun { capacity: 1 }));

        let mut lenient = Instance::create("lenient", &raw, 1, OverrunPolicy::Ignore);
        lenient.append_child(Value::from(1)).unwrap();
        lenient.append_child(Value::from(2)).unwrap();
        assert_eq!(lenient.finish().unwrap(), Value::sequence([1]));
    }
}
