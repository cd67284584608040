//! Worker Lifecycle and Admission
//!
//! The worker manager is the front door for connections: it enforces the
//! client limit, hands out worker IDs and actor slots for ID generation,
//! and wires each new [`Worker`] into the shard layer.
//!
//! Admission and the live count share one source of truth, the worker
//! registry inside the shard manager. Registration is a guarded
//! check-and-insert against that map, so the limit holds even when many
//! connections arrive at once, and a worker disappearing from the map *is*
//! its slot being freed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::ident::IdGenerator;
use crate::shard::{ResponseRouter, ShardManager};
use crate::worker::handler::Worker;

/// Rejections at the engine's front door.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("max clients reached ({limit})")]
    MaxClientsReached { limit: usize },
}

/// Creates and tracks workers.
#[derive(Debug)]
pub struct WorkerManager {
    shards: Arc<ShardManager>,
    ids: Arc<IdGenerator>,
    max_clients: usize,
    response_timeout: Duration,
    next_worker: AtomicU64,
}

impl WorkerManager {
    pub fn new(
        shards: Arc<ShardManager>,
        ids: Arc<IdGenerator>,
        max_clients: usize,
        response_timeout: Duration,
    ) -> Self {
        Self {
            shards,
            ids,
            max_clients,
            response_timeout,
            next_worker: AtomicU64::new(0),
        }
    }

    /// Admits one new worker, or rejects it when the engine is full.
    ///
    /// Worker IDs never repeat. Actor slots for ID generation are reused
    /// modulo the generator's capacity; slot sharing is safe because the
    /// underlying counters are atomic.
    pub fn register(self: &Arc<Self>) -> Result<Worker, RegisterError> {
        let n = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let id = format!("worker-{}", n);
        let actor = (n % u64::from(self.ids.layout().actor_capacity())) as u32;

        let router = Arc::new(ResponseRouter::new());
        if !self
            .shards
            .try_register_worker(id.clone(), Arc::clone(&router), self.max_clients)
        {
            warn!(max_clients = self.max_clients, "connection rejected: engine full");
            return Err(RegisterError::MaxClientsReached {
                limit: self.max_clients,
            });
        }
        debug!(worker_id = %id, actor, "worker admitted");

        Ok(Worker::new(
            id,
            actor,
            Arc::clone(&self.ids),
            Arc::clone(&self.shards),
            router,
            self.response_timeout,
            Arc::clone(self),
        ))
    }

    /// Frees a worker's slot. Called from [`Worker`]'s `Drop`.
    pub(crate) fn release(&self, worker_id: &str) {
        self.shards.unregister_worker(worker_id);
    }

    /// Number of workers currently admitted.
    pub fn worker_count(&self) -> usize {
        self.shards.worker_count()
    }

    /// The admission limit.
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }
}
