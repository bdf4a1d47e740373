//! Error types for the arbor engine

use crate::builder::BuildError;
use crate::config::ConfigError;
use crate::runtime::InstanceId;
use thiserror::Error;

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// A scoped read ran outside any provider for the store
    #[error("Store is not provided.")]
    MissingScope,

    /// The positional filler was asked for more slots than it discovered
    #[error("filler overrun: all {capacity} embedded slots are already filled")]
    FillerOverrun {
        /// Number of slots the filler discovered
        capacity: usize,
    },

    /// An instance was finalized before every child reported in
    #[error("instance `{name}` finished with {filled} of {total} embedded children")]
    IncompleteInstance {
        /// Builder name of the instance
        name: String,
        /// Children written so far
        filled: usize,
        /// Children expected
        total: usize,
    },

    /// A child's slot could not be found in the instance's clone
    #[error("instance `{name}` has no embedded slot at position {position}")]
    MissingSlot {
        /// Builder name of the instance
        name: String,
        /// Discovery position of the slot
        position: usize,
    },

    /// A builder function failed
    #[error("builder `{name}` failed: {source}")]
    Builder {
        /// Builder name
        name: String,
        /// Error returned by the builder
        #[source]
        source: BuildError,
    },

    /// An embedded marker that is not a builder invocation
    #[error("embedded value `{name}` is not a builder invocation")]
    UnknownEmbedding {
        /// Diagnostic name of the marker
        name: String,
    },

    /// The tree refers to an invocation that is no longer mounted
    #[error("instance {0} is not mounted")]
    NotMounted(InstanceId),

    /// `settle` was called while a pass was running
    #[error("a recomputation pass is already running")]
    PassInProgress,

    /// The store kept scheduling work past the configured bound
    #[error("store did not settle after {0} passes")]
    RebuildLimit(usize),

    /// The store was torn down
    #[error("store has been torn down")]
    TornDown,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
