//! # RiftDB - A Sharded In-Memory Key-Value Database
//!
//! RiftDB is an in-memory key-value database written in Rust. Keys are
//! partitioned across shards, and each shard is owned by exactly one
//! task, so no command ever races another for the same key.
//!
//! ## Features
//!
//! - **Shard Ownership**: One task per shard; commands for a key always
//!   run on its owning shard, in arrival order
//! - **Multi-Key Commands**: MSET, MGET, RENAME and COPY are decomposed,
//!   scattered across shards and their replies recomposed
//! - **TTL Support**: Keys can have expiry times with lazy and active cleanup
//! - **Eviction**: Approximate-LRU, random and oldest-first policies keep
//!   each shard under its key budget
//! - **Async I/O**: Built on Tokio for handling thousands of concurrent connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               RiftDB                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│   Worker    │                  │
//! │  │ (Listener)  │    │  Handler    │    │ (per client)│                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │ StoreOp                 │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │ Response    │    │               ShardManager                   │   │
//! │  │ Router      │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │ (per worker)│<───│  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │task    │ │task    │ │task    │ │tasks   │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                        each shard task: store + expiry sweep            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use riftdb::config::Config;
//! use riftdb::connection::{handle_connection, ConnectionStats};
//! use riftdb::engine::Engine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let engine = Arc::new(Engine::new(&config)?);
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind(("127.0.0.1", 7379)).await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let engine = Arc::clone(&engine);
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, engine, stats));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! ### String Commands
//! - `SET key value [EX seconds | PX milliseconds | KEEPTTL] [NX|XX]`
//! - `GET key`
//! - `GETDEL key`
//! - `GETEX key [EX seconds | PX milliseconds | PERSIST]`
//! - `DEL key [key ...]`
//! - `MSET key value [key value ...]`
//! - `MGET key [key ...]`
//!
//! ### Key Commands
//! - `EXPIRE key seconds [NX|XX|GT|LT]`
//! - `TTL key`
//! - `PERSIST key`
//! - `RENAME key newkey`
//! - `COPY source destination [REPLACE]`
//! - `KEYS pattern`
//!
//! ### Server Commands
//! - `PING [message]`
//! - `DBSIZE`
//! - `FLUSHDB`
//! - `ABORT`
//!
//! ## Module Overview
//!
//! - [`command`]: Command names, arguments and routing classes
//! - [`storage`]: Per-shard store with TTL and eviction
//! - [`shard`]: Shard tasks, dispatch and response routing
//! - [`worker`]: Per-connection workers and multi-shard orchestration
//! - [`engine`]: Wires shards and workers together
//! - [`connection`]: Client connection management
//!
//! ## Design Highlights
//!
//! ### Single Writer Per Key
//!
//! Every key hashes to exactly one shard, and each shard is a task that
//! processes its mailbox serially. Stores need no locks at all, and two
//! commands for the same key can never interleave.
//!
//! ### Scatter/Gather for Multi-Key Commands
//!
//! A command touching several keys is decomposed into single-shard pieces
//! that share one request ID. The pieces run on their owning shards
//! concurrently; the worker gathers the replies, reorders them by
//! sequence number and composes the final response.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: Each shard task periodically samples its expiry table
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod ident;
pub mod ops;
pub mod shard;
pub mod storage;
pub mod worker;

// Re-export commonly used types for convenience
pub use command::{Command, CommandKind};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use engine::Engine;
pub use ops::{CommandError, StoreOp, StoreResponse, Value};
pub use storage::{EvictionPolicy, ShardStore};

/// The default port RiftDB listens on
pub const DEFAULT_PORT: u16 = 7379;

/// The default host RiftDB binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of RiftDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
