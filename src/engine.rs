//! Engine Facade
//!
//! Wires the ID generator, shard pool and worker manager together behind a
//! single handle. The server binary builds one [`Engine`] at startup and
//! calls [`Engine::connect`] once per accepted connection; embedders can do
//! exactly the same without any networking.
//!
//! ```text
//!   Engine::new(&config)
//!     ├── IdGenerator          (correlation IDs)
//!     ├── ShardManager         (N executor tasks + registry)
//!     └── WorkerManager        (admission, client limit)
//!
//!   Engine::connect() ──▶ Worker (one per client)
//! ```

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::ident::IdGenerator;
use crate::shard::ShardManager;
use crate::storage::ExpiryConfig;
use crate::worker::{RegisterError, Worker, WorkerManager};

/// A running database engine.
///
/// # Example
///
/// ```
/// use riftdb::command::Command;
/// use riftdb::config::Config;
/// use riftdb::engine::Engine;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let engine = Engine::new(&Config::default())?;
/// let worker = engine.connect()?;
///
/// let reply = worker
///     .execute(Command::new("SET", vec!["k".into(), "v".into()]))
///     .await;
/// # engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    shards: Arc<ShardManager>,
    workers: Arc<WorkerManager>,
}

impl Engine {
    /// Validates `config` and starts the shard executors.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let ids = Arc::new(IdGenerator::new());
        let shards = Arc::new(ShardManager::new(
            config.shard_count,
            config.max_keys,
            config.eviction_policy,
            config.eviction_ratio,
            ExpiryConfig {
                sample_size: config.expiry_sample_size,
                repeat_threshold: config.expiry_threshold,
                interval: config.expiry_interval,
            },
        ));
        let workers = Arc::new(WorkerManager::new(
            Arc::clone(&shards),
            ids,
            config.max_clients,
            config.response_timeout,
        ));

        info!(
            shard_count = config.shard_count,
            max_clients = config.max_clients,
            "engine ready"
        );
        Ok(Self { shards, workers })
    }

    /// Admits a new client and returns its worker.
    pub fn connect(&self) -> Result<Worker, RegisterError> {
        self.workers.register()
    }

    /// Number of clients currently connected.
    pub fn worker_count(&self) -> usize {
        self.workers.worker_count()
    }

    /// Number of shards the keyspace is split over.
    pub fn shard_count(&self) -> usize {
        self.shards.shard_count()
    }

    /// Stops every shard executor after it drains its queue.
    pub async fn shutdown(&self) {
        self.shards.shutdown().await;
    }
}
