//! Print the effective engine configuration.

use super::load_config;
use anyhow::Result;
use std::path::Path;

pub fn show_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    if !config_path.exists() {
        eprintln!("{} not found; using defaults", config_path.display());
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
