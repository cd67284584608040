//! Worker Layer
//!
//! Workers are the per-connection half of the engine. Each one classifies
//! incoming commands, runs the multi-shard pipeline when a command spans
//! shards, and folds shard responses into single client replies. The
//! manager admits workers and enforces the client limit.

pub mod handler;
pub mod manager;

mod compose;
mod decompose;

// Re-export commonly used types
pub use handler::Worker;
pub use manager::{RegisterError, WorkerManager};
