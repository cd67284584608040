//! Shard Manager
//!
//! Owns the pool of shard executors and the routing between them and the
//! workers. Keys are assigned to shards by hashing, so a key's owner is a
//! pure function of the key and the shard count and never changes while the
//! engine runs.
//!
//! ```text
//!                      ShardManager
//!   owner_of(key) ──▶  hash(key) % N
//!   dispatch(op) ────▶ senders[op.shard_id] ──▶ ShardExecutor #i
//!                      WorkerRegistry: worker_id → ResponseRouter
//! ```
//!
//! The worker registry is the single source of truth for connected workers:
//! registration inserts, deregistration removes, and the live count is just
//! the map's size. Shards use it to find the router that should receive each
//! response.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ops::StoreOp;
use crate::shard::executor::ShardExecutor;
use crate::shard::router::ResponseRouter;
use crate::storage::{EvictionPolicy, ExpiryConfig, ShardStore};

/// Queued operations per shard before senders start waiting.
const OPS_CHANNEL_CAPACITY: usize = 1024;

/// Failure to hand an operation to a shard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("shard {0} does not exist")]
    InvalidShard(usize),
    #[error("shard {0} is no longer accepting operations")]
    ShardClosed(usize),
}

/// Maps worker IDs to the router their responses go through.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    routers: RwLock<HashMap<String, Arc<ResponseRouter>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            routers: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, worker_id: String, router: Arc<ResponseRouter>) {
        self.routers.write().unwrap().insert(worker_id, router);
    }

    /// Inserts only while the map holds fewer than `limit` workers. The
    /// check and the insert happen under one lock, so concurrent admissions
    /// cannot overshoot the limit.
    pub fn try_insert(
        &self,
        worker_id: String,
        router: Arc<ResponseRouter>,
        limit: usize,
    ) -> bool {
        let mut routers = self.routers.write().unwrap();
        if routers.len() >= limit {
            return false;
        }
        routers.insert(worker_id, router);
        true
    }

    pub fn remove(&self, worker_id: &str) -> bool {
        self.routers.write().unwrap().remove(worker_id).is_some()
    }

    pub fn router_of(&self, worker_id: &str) -> Option<Arc<ResponseRouter>> {
        self.routers.read().unwrap().get(worker_id).cloned()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.routers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns and fronts the shard executor pool.
#[derive(Debug)]
pub struct ShardManager {
    senders: Vec<mpsc::Sender<StoreOp>>,
    registry: Arc<WorkerRegistry>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ShardManager {
    /// Creates the manager and spawns one executor task per shard.
    ///
    /// `max_keys` is the whole-engine key budget; each shard gets an equal
    /// slice of it. Must be called from within a Tokio runtime.
    pub fn new(
        shard_count: usize,
        max_keys: usize,
        policy: EvictionPolicy,
        eviction_ratio: f64,
        expiry: ExpiryConfig,
    ) -> Self {
        let shard_count = shard_count.max(1);
        let keys_per_shard = (max_keys / shard_count).max(1);
        let registry = Arc::new(WorkerRegistry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut senders = Vec::with_capacity(shard_count);
        let mut handles = Vec::with_capacity(shard_count);
        for shard_id in 0..shard_count {
            let (tx, rx) = mpsc::channel(OPS_CHANNEL_CAPACITY);
            let executor = ShardExecutor::new(
                shard_id,
                ShardStore::new(keys_per_shard, policy, eviction_ratio),
                rx,
                Arc::clone(&registry),
                expiry.clone(),
                shutdown_rx.clone(),
            );
            senders.push(tx);
            handles.push(tokio::spawn(executor.run()));
        }

        info!(
            shard_count,
            keys_per_shard,
            %policy,
            "shard executors started"
        );

        Self {
            senders,
            registry,
            shutdown_tx,
            handles: Mutex::new(handles),
        }
    }

    /// Number of shards in the pool.
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }

    /// The shard that owns `key`. Stable for the lifetime of the manager.
    #[inline]
    pub fn owner_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }

    /// Queues an operation on its destination shard, waiting when the
    /// shard's queue is full. Order of dispatch to one shard is the order
    /// the shard executes in.
    pub async fn dispatch(&self, op: StoreOp) -> Result<(), DispatchError> {
        let shard_id = op.shard_id;
        let sender = self
            .senders
            .get(shard_id)
            .ok_or(DispatchError::InvalidShard(shard_id))?;
        sender
            .send(op)
            .await
            .map_err(|_| DispatchError::ShardClosed(shard_id))
    }

    /// Registers a worker's response router.
    pub fn register_worker(&self, worker_id: String, router: Arc<ResponseRouter>) {
        debug!(worker_id = %worker_id, "worker registered");
        self.registry.insert(worker_id, router);
    }

    /// Registers a worker unless the registry already holds `limit` workers.
    pub fn try_register_worker(
        &self,
        worker_id: String,
        router: Arc<ResponseRouter>,
        limit: usize,
    ) -> bool {
        let admitted = self.registry.try_insert(worker_id.clone(), router, limit);
        if admitted {
            debug!(worker_id = %worker_id, "worker registered");
        }
        admitted
    }

    /// Removes a worker's response router. Responses already in flight for
    /// it will be dropped by the shards.
    pub fn unregister_worker(&self, worker_id: &str) {
        if self.registry.remove(worker_id) {
            debug!(worker_id = %worker_id, "worker unregistered");
        }
    }

    /// Number of workers currently registered.
    pub fn worker_count(&self) -> usize {
        self.registry.len()
    }

    /// Signals every executor to stop and waits for them to finish draining.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        info!("shard executors stopped");
    }
}

impl Drop for ShardManager {
    fn drop(&mut self) {
        // Executors not already joined via shutdown() still get the signal.
        let _ = self.shutdown_tx.send(true);
    }
}
