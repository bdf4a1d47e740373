//! CLI command implementations.

pub mod config;
pub mod counters;
pub mod inspect;
pub mod todo;

pub use config::show_config;
pub use counters::{run_counters, CounterOptions};
pub use inspect::inspect_tree;
pub use todo::{run_todo, TodoOptions};

use anyhow::{anyhow, Context, Result};
use arbor_incremental::{Action, EngineConfig, Store, Value};
use std::path::Path;

/// Load the engine configuration, falling back to defaults when the file is absent
pub(crate) fn load_config(config_path: &Path) -> Result<EngineConfig> {
    EngineConfig::load_or_default(config_path).context("Failed to load configuration")
}

/// Action stored at `path` in the store's current snapshot
pub(crate) fn action_at(store: &Store, path: &str) -> Result<Action> {
    store
        .get_state()
        .pointer(path)
        .and_then(Value::as_action)
        .cloned()
        .ok_or_else(|| anyhow!("no action at {path}"))
}
