//! Todo list demo.

use super::{action_at, load_config};
use crate::demo::todo_list;
use anyhow::{bail, Context, Result};
use arbor_incremental::{create_store_with_config, Store, Value};
use serde::Serialize;
use std::path::Path;

/// Options for the `todo` command
pub struct TodoOptions {
    pub add: Vec<String>,
    pub toggle: Vec<usize>,
    pub remove: Vec<usize>,
    pub json: bool,
}

#[derive(Serialize)]
struct TodoReport<'a> {
    version: u64,
    remaining: usize,
    items: &'a Value,
}

/// Add, then toggle, then remove items; each step is one settled batch.
pub fn run_todo(config_path: &Path, opts: TodoOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let store = create_store_with_config(&todo_list(), None, config);
    store.settle().context("Failed to build todo list")?;

    let remaining = store.select(|state| {
        state
            .get("items")
            .and_then(Value::as_sequence)
            .map_or(0, |items| {
                items
                    .iter()
                    .filter(|item| item.get("done").and_then(Value::as_bool) == Some(false))
                    .count()
            })
    });

    let add = action_at(&store, "/add")?;
    for title in &opts.add {
        add.invoke_with(&[Value::from(title.as_str())]);
    }
    store.settle()?;

    for &index in &opts.toggle {
        ensure_item(&store, index)?;
        action_at(&store, &format!("/items/{index}/toggle"))?.invoke();
    }
    store.settle()?;

    // Highest position first so earlier removals do not shift later ones
    let mut removals = opts.remove.clone();
    removals.sort_unstable_by(|a, b| b.cmp(a));
    removals.dedup();
    let remove = action_at(&store, "/remove")?;
    for index in removals {
        ensure_item(&store, index)?;
        remove.invoke_with(&[Value::from(index as i64)]);
    }
    store.settle()?;

    let snapshot = store.get_state();
    let items = snapshot.get("items").cloned().unwrap_or_default();
    if opts.json {
        let report = TodoReport {
            version: store.version(),
            remaining: remaining.get(),
            items: &items,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for item in items.as_sequence().into_iter().flatten() {
        let mark = if item.get("done").and_then(Value::as_bool) == Some(true) {
            "x"
        } else {
            " "
        };
        let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
        println!("[{mark}] {title}");
    }
    println!("{} remaining", remaining.get());
    Ok(())
}

fn ensure_item(store: &Store, index: usize) -> Result<()> {
    let len = store
        .get_state()
        .get("items")
        .and_then(Value::as_sequence)
        .map_or(0, Vec::len);
    if index >= len {
        bail!("no todo item at position {index} (list has {len})");
    }
    Ok(())
}
