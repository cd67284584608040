//! Storage Layer
//!
//! Everything a single shard knows about its slice of the keyspace lives
//! here. There is no cross-shard state and no locking; each
//! [`ShardStore`](store::ShardStore) is owned by exactly one executor task.
//!
//! ```text
//!   ┌──────────────────────────────────────────┐
//!   │                ShardStore                │
//!   │                                          │
//!   │   data ──────── key → Object             │
//!   │   expiries ──── key → deadline           │
//!   │                                          │
//!   │   eviction ──── frees space on insert    │
//!   │   expiry ────── sampling sweep for TTLs  │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use riftdb::storage::{EvictionPolicy, ShardStore};
//! use bytes::Bytes;
//!
//! let mut store = ShardStore::new(1024, EvictionPolicy::AllKeysLru, 0.1);
//! store.put("greeting".to_string(), Bytes::from("hello"));
//! assert!(store.contains("greeting"));
//! ```

pub mod eviction;
pub mod expiry;
pub mod object;
pub mod store;

// Re-export commonly used types
pub use eviction::EvictionPolicy;
pub use expiry::{sweep_expired, ExpiryConfig, SweepStats};
pub use object::Object;
pub use store::ShardStore;
