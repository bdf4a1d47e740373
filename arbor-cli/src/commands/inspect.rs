//! Show the invocation tree of a settled store.

use super::load_config;
use crate::demo::dashboard;
use anyhow::{Context, Result};
use arbor_incremental::{create_store_with_config, InstanceInfo};
use std::path::Path;

pub fn inspect_tree(config_path: &Path, keys: Vec<String>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = create_store_with_config(&dashboard(keys), None, config);
    store.settle().context("Failed to build dashboard")?;

    let tree = store
        .inspect()
        .context("Store has no mounted invocations")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_node(&tree, 0);
    }
    Ok(())
}

fn print_node(node: &InstanceInfo, depth: usize) {
    let occurrence = if node.occurrence > 0 {
        format!(" #{}", node.occurrence)
    } else {
        String::new()
    };
    println!(
        "{}{} [{}]{} cells={} id={}",
        "  ".repeat(depth),
        node.name,
        node.key,
        occurrence,
        node.cells,
        node.id
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
