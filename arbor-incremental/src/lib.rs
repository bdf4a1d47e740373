//! Arbor composition engine
//!
//! Turns a tree of builder invocations into one versioned, immutable
//! snapshot and publishes it through a subscription API with memoized
//! derived reads.
//!
//! # Architecture
//!
//! A builder returns a raw [`Value`] in which some leaves are embedded
//! invocations of other builders, created with [`from`]. The runtime gives
//! each invocation a stable identity and a list of persistent state cells,
//! resolves the children bottom-up, and merges each child's snapshot into a
//! fresh clone of its parent's raw structure at the position its marker
//! occupied:
//!
//! ```text
//! builder -> raw structure -> discover children -> clone -> fill -> snapshot -> container
//! ```
//!
//! Changing a state cell marks its invocation dirty. The next pass re-runs
//! dirty builders, refills their ancestors from retained raw structures and
//! reuses everything else, then commits the new root snapshot.
//!
//! # Example
//!
//! ```rust
//! use arbor_incremental::{create_store, from, state, Action, Builder, Value};
//!
//! let counter = Builder::new("counter", |cx, _props| {
//!     let (count, set_count) = cx.use_state(|| 0i64);
//!     Ok(state(Value::mapping([
//!         ("count", Value::from(count)),
//!         ("increment", Value::Action(Action::new(move || set_count.update(|n| n + 1)))),
//!     ])))
//! });
//! let root = Builder::new("root", move |_cx, _props| {
//!     Ok(Value::mapping([("counter", from(&counter, None))]))
//! });
//!
//! let store = create_store(&root, None);
//! store.settle()?;
//! assert_eq!(store.get_state().pointer("/counter/count"), Some(&Value::from(0)));
//!
//! store.get_state().pointer("/counter/increment").and_then(Value::as_action).unwrap().invoke();
//! store.settle()?;
//! assert_eq!(store.get_state().pointer("/counter/count"), Some(&Value::from(1)));
//! # Ok::<(), arbor_incremental::EngineError>(())
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

// Structural core
pub mod clone;
pub mod discovery;
pub mod instance;

// Invocations and their state
pub mod builder;
pub mod cells;
pub mod context;
pub mod runtime;

// Publishing
pub mod container;
pub mod scope;
pub mod selector;
pub mod store;

pub mod config;
pub mod error;
pub mod metrics;

pub use arbor_types::{Action, EmbeddedRef, Embedding, Mapping, Value};
pub use builder::{from, state, BuildError, BuildResult, Builder, BuilderCall, Props, KEY_PROP, REF_PROP};
pub use cells::{CellRegistry, Cx, StateSetter};
pub use clone::{clone_structure, FillOutcome, Filler};
pub use config::{ConfigError, EngineConfig, OverrunPolicy};
pub use container::{Container, Snapshot, Subscription};
pub use context::ContextProvider;
pub use discovery::{count_embedded, discover, walk_embedded, Segment, SlotPath};
pub use error::{EngineError, Result};
pub use instance::{Instance, InstanceState};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use runtime::{InstanceId, InstanceInfo, PassOutcome, Runtime};
pub use scope::{current_store, use_selector, Provider};
pub use selector::Selector;
pub use store::{create_store, create_store_with_config, Store};

/// Commonly used items
pub mod prelude {
    pub use crate::{
        create_store, from, state, Action, Builder, Cx, EngineError, Props, Store, Value,
    };
}
