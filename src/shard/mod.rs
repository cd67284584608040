//! Shard Layer
//!
//! A shard is one slice of the keyspace plus the single task allowed to
//! touch it. This module contains the executor task, the manager that owns
//! the pool of executors, and the response routing that carries results
//! back to waiting workers.
//!
//! ```text
//!   Worker ──▶ ShardManager.dispatch ──▶ ShardExecutor (owns ShardStore)
//!      ▲                                        │
//!      └───── ResponseRouter ◀── WorkerRegistry ┘
//! ```

pub mod executor;
pub mod manager;
pub mod router;

// Re-export commonly used types
pub use executor::ShardExecutor;
pub use manager::{DispatchError, ShardManager, WorkerRegistry};
pub use router::{PendingTicket, ResponseRouter, WaiterKind};
