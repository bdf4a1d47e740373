//! # arbor CLI
//!
//! Drives demo stores built on the arbor composition engine.

mod commands;
mod demo;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "arbor.yml", env = "ARBOR_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dashboard of keyed counters
    Counters {
        /// Counter keys (comma separated)
        #[arg(long, value_delimiter = ',', default_value = "a,b")]
        keys: Vec<String>,

        /// Increment the counter with this key (repeatable)
        #[arg(long)]
        increment: Vec<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,

        /// Print engine metrics after the run
        #[arg(long)]
        metrics: bool,
    },

    /// Run a todo list
    Todo {
        /// Add an item with this title (repeatable)
        #[arg(long)]
        add: Vec<String>,

        /// Toggle the item at this position (repeatable)
        #[arg(long)]
        toggle: Vec<usize>,

        /// Remove the item at this position (repeatable)
        #[arg(long)]
        remove: Vec<usize>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the invocation tree of the counters dashboard
    Inspect {
        /// Counter keys (comma separated)
        #[arg(long, value_delimiter = ',', default_value = "a,b")]
        keys: Vec<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the effective engine configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Counters {
            keys,
            increment,
            json,
            metrics,
        } => {
            let opts = commands::CounterOptions {
                keys,
                increments: increment,
                json,
                metrics,
            };
            commands::run_counters(&cli.config, opts)
        }
        Commands::Todo {
            add,
            toggle,
            remove,
            json,
        } => {
            let opts = commands::TodoOptions {
                add,
                toggle,
                remove,
                json,
            };
            commands::run_todo(&cli.config, opts)
        }
        Commands::Inspect { keys, json } => commands::inspect_tree(&cli.config, keys, json),
        Commands::Config => commands::show_config(&cli.config),
    }
}
