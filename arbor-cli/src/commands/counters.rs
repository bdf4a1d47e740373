//! Keyed counters dashboard.

use super::{action_at, load_config};
use crate::demo::dashboard;
use anyhow::{bail, Context, Result};
use arbor_incremental::{create_store_with_config, MetricsSnapshot, Value};
use serde::Serialize;
use std::path::Path;

/// Options for the `counters` command
pub struct CounterOptions {
    pub keys: Vec<String>,
    pub increments: Vec<String>,
    pub json: bool,
    pub metrics: bool,
}

#[derive(Serialize)]
struct CounterReport<'a> {
    version: u64,
    total: i64,
    snapshot: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<MetricsSnapshot>,
}

/// Build the dashboard, apply the requested increments in one batch and print the result.
pub fn run_counters(config_path: &Path, opts: CounterOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let store = create_store_with_config(&dashboard(opts.keys.clone()), None, config);
    store.settle().context("Failed to build dashboard")?;

    let total = store.select(|state| {
        state
            .get("counters")
            .and_then(Value::as_mapping)
            .map(|counters| {
                counters
                    .values()
                    .filter_map(|counter| counter.get("count").and_then(Value::as_i64))
                    .sum::<i64>()
            })
            .unwrap_or(0)
    });

    for key in &opts.increments {
        if !opts.keys.contains(key) {
            bail!("no counter named `{key}`");
        }
        action_at(&store, &format!("/counters/{key}/increment"))?.invoke();
    }
    store.settle().context("Failed to apply increments")?;

    let snapshot = store.get_state();
    if opts.json {
        let report = CounterReport {
            version: store.version(),
            total: total.get(),
            snapshot: &snapshot,
            metrics: opts.metrics.then(|| store.metrics()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for key in &opts.keys {
        let count = snapshot
            .pointer(&format!("/counters/{key}/count"))
            .and_then(Value::as_i64)
            .unwrap_or_default();
        println!("{key}: {count}");
    }
    println!("total: {} (version {})", total.get(), store.version());
    if opts.metrics {
        println!("Metrics:");
        print!("{}", store.metrics());
    }
    Ok(())
}
