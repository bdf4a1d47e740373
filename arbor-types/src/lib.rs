//! Shared types for arbor
//!
//! This crate provides the value model used across the arbor ecosystem:
//! the untyped structures builders return, the snapshots readers see, and
//! the opaque leaves (actions, embedded computations) that can appear in
//! either.

mod embedding;
mod value;

pub use embedding::{Embedding, EmbeddedRef};
pub use value::{Action, Mapping, Value};
