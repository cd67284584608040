//! Shard Executor
//!
//! One executor task per shard. The executor owns its [`ShardStore`] outright
//! and is the only code that ever touches it, which is what lets the store
//! stay lock-free: mutual exclusion is by ownership, not by locking.
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!   ops channel ──▶│  select! loop                │
//!                  │   ├─ op      → evaluate      │──▶ worker's router
//!   sweep timer ──▶│   ├─ tick    → expiry sweep  │
//!                  │   └─ signal  → drain, stop   │
//!   shutdown ─────▶│                              │
//!                  └──────────────────────────────┘
//! ```
//!
//! Operations are processed strictly in arrival order, so two writes to the
//! same key can never race. A panic while evaluating one operation is caught
//! and turned into an error response for that operation alone; the executor
//! keeps serving the queue.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::command::Command;
use crate::ops::{CommandError, StoreOp, StoreResponse, Value};
use crate::shard::manager::WorkerRegistry;
use crate::storage::{sweep_expired, ExpiryConfig, ShardStore};

/// The long-running task that services one shard.
#[derive(Debug)]
pub struct ShardExecutor {
    shard_id: usize,
    store: ShardStore,
    ops_rx: mpsc::Receiver<StoreOp>,
    registry: Arc<WorkerRegistry>,
    expiry: ExpiryConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl ShardExecutor {
    pub fn new(
        shard_id: usize,
        store: ShardStore,
        ops_rx: mpsc::Receiver<StoreOp>,
        registry: Arc<WorkerRegistry>,
        expiry: ExpiryConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            shard_id,
            store,
            ops_rx,
            registry,
            expiry,
            shutdown_rx,
        }
    }

    /// Runs until shutdown is signalled or every op sender is gone.
    ///
    /// On shutdown the op queue is drained first, so every operation already
    /// accepted gets a response before the task stops.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.expiry.interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(shard_id = self.shard_id, "shard executor started");
        loop {
            tokio::select! {
                maybe_op = self.ops_rx.recv() => match maybe_op {
                    Some(op) => self.handle(op),
                    None => break,
                },
                _ = sweep.tick() => {
                    let stats = sweep_expired(&mut self.store, &self.expiry);
                    if stats.expired > 0 {
                        debug!(
                            shard_id = self.shard_id,
                            rounds = stats.rounds,
                            expired = stats.expired,
                            "expiry sweep"
                        );
                    }
                },
                _ = self.shutdown_rx.changed() => {
                    self.drain();
                    break;
                }
            }
        }
        debug!(shard_id = self.shard_id, "shard executor stopped");
    }

    /// Evaluates one operation and routes the response to its worker.
    fn handle(&mut self, op: StoreOp) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            evaluate(&mut self.store, &op.command, op.pre_processing)
        }));

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic);
                error!(
                    shard_id = self.shard_id,
                    command = %op.command.name,
                    message,
                    "panic while evaluating operation"
                );
                Err(CommandError::ShardFailure(message))
            }
        };

        let response = StoreResponse {
            seq_id: op.seq_id,
            request_id: op.request_id,
            result,
        };

        match self.registry.router_of(&op.worker_id) {
            Some(router) => {
                router.deliver(op.pre_processing, response);
            }
            None => {
                debug!(
                    shard_id = self.shard_id,
                    worker_id = %op.worker_id,
                    "worker unregistered before its response was ready"
                );
            }
        }
    }

    /// Answers everything already queued without waiting for more.
    fn drain(&mut self) {
        while let Ok(op) = self.ops_rx.try_recv() {
            self.handle(op);
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ===== COMMAND EVALUATION =====

/// Evaluates a command against a shard's store.
///
/// Preprocessing reads are dispatched separately: they run before the request
/// proper and only ever read.
fn evaluate(store: &mut ShardStore, cmd: &Command, pre_processing: bool) -> Result<Value, CommandError> {
    if pre_processing {
        return preprocess(store, cmd);
    }

    match cmd.name.as_str() {
        "SET" => eval_set(store, &cmd.args),
        "GET" => eval_get(store, &cmd.args),
        "DEL" => eval_del(store, &cmd.args),
        "GETDEL" => eval_getdel(store, &cmd.args),
        "GETEX" => eval_getex(store, &cmd.args),
        "EXPIRE" => eval_expire(store, &cmd.args),
        "TTL" => eval_ttl(store, &cmd.args),
        "PERSIST" => eval_persist(store, &cmd.args),
        "OBJECTCOPY" => eval_object_copy(store, cmd),
        "KEYS" => eval_keys(store, &cmd.args),
        "DBSIZE" => eval_dbsize(store, &cmd.args),
        "FLUSHDB" => eval_flushdb(store, &cmd.args),
        #[cfg(test)]
        "PANIC" => panic!("induced failure"),
        other => Err(CommandError::UnknownCommand(other.to_lowercase())),
    }
}

/// Read-only lookups that feed a multi-shard pipeline before it scatters.
fn preprocess(store: &mut ShardStore, cmd: &Command) -> Result<Value, CommandError> {
    match cmd.name.as_str() {
        "RENAME" | "COPY" => {
            let key = cmd
                .args
                .first()
                .ok_or_else(|| CommandError::WrongArgumentCount(cmd.name.to_lowercase()))?;
            match store.get(key) {
                Some(obj) => Ok(Value::Str(obj.value.clone())),
                None => Err(CommandError::NoSuchKey),
            }
        }
        other => Err(CommandError::UnknownCommand(other.to_lowercase())),
    }
}

fn eval_set(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    if args.len() < 2 {
        return Err(CommandError::WrongArgumentCount("set".into()));
    }
    let key = &args[0];
    let value = &args[1];

    let mut expire_at: Option<Instant> = None;
    let mut keep_ttl = false;
    let mut nx = false;
    let mut xx = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].to_uppercase().as_str() {
            unit @ ("EX" | "PX") => {
                let raw = args.get(i + 1).ok_or(CommandError::Syntax)?;
                let duration = expire_duration("set", raw, unit == "PX")?;
                expire_at = Some(deadline("set", duration)?);
                i += 2;
            }
            "KEEPTTL" => {
                keep_ttl = true;
                i += 1;
            }
            "NX" => {
                nx = true;
                i += 1;
            }
            "XX" => {
                xx = true;
                i += 1;
            }
            _ => return Err(CommandError::Syntax),
        }
    }

    if (nx && xx) || (keep_ttl && expire_at.is_some()) {
        return Err(CommandError::Syntax);
    }

    let exists = store.contains(key);
    if (nx && exists) || (xx && !exists) {
        return Ok(Value::Nil);
    }

    // put() drops any existing deadline, so capture it when asked to keep it.
    let preserved = if keep_ttl { store.expiry_of(key) } else { None };
    store.put(key.clone(), Bytes::from(value.clone()));
    if let Some(at) = expire_at.or(preserved) {
        store.set_expiry(key, at);
    }

    Ok(Value::Ok)
}

fn eval_get(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    let [key] = args else {
        return Err(CommandError::WrongArgumentCount("get".into()));
    };
    Ok(match store.get(key) {
        Some(obj) => Value::Str(obj.value.clone()),
        None => Value::Nil,
    })
}

fn eval_del(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    if args.is_empty() {
        return Err(CommandError::WrongArgumentCount("del".into()));
    }
    let deleted = args.iter().filter(|key| store.del(key)).count();
    Ok(Value::Int(deleted as i64))
}

fn eval_getdel(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    let [key] = args else {
        return Err(CommandError::WrongArgumentCount("getdel".into()));
    };
    match store.get(key).map(|obj| obj.value.clone()) {
        Some(value) => {
            store.del(key);
            Ok(Value::Str(value))
        }
        None => Ok(Value::Nil),
    }
}

fn eval_getex(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    if args.is_empty() {
        return Err(CommandError::WrongArgumentCount("getex".into()));
    }
    let key = &args[0];

    enum TtlChange {
        None,
        Set(Instant),
        Clear,
    }

    let mut change = TtlChange::None;
    let mut i = 1;
    while i < args.len() {
        match args[i].to_uppercase().as_str() {
            unit @ ("EX" | "PX") => {
                let raw = args.get(i + 1).ok_or(CommandError::Syntax)?;
                let duration = expire_duration("getex", raw, unit == "PX")?;
                change = TtlChange::Set(deadline("getex", duration)?);
                i += 2;
            }
            "PERSIST" => {
                change = TtlChange::Clear;
                i += 1;
            }
            _ => return Err(CommandError::Syntax),
        }
    }

    let value = match store.get(key) {
        Some(obj) => obj.value.clone(),
        None => return Ok(Value::Nil),
    };

    match change {
        TtlChange::None => {}
        TtlChange::Set(at) => {
            store.set_expiry(key, at);
        }
        TtlChange::Clear => {
            store.clear_expiry(key);
        }
    }

    Ok(Value::Str(value))
}

fn eval_expire(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(CommandError::WrongArgumentCount("expire".into()));
    }
    let key = &args[0];
    let duration = expire_duration("expire", &args[1], false)?;
    let at = deadline("expire", duration)?;

    if !store.contains(key) {
        return Ok(Value::Int(0));
    }

    let current = store.expiry_of(key);
    let allowed = match args.get(2) {
        None => true,
        Some(flag) => match flag.to_uppercase().as_str() {
            "NX" => current.is_none(),
            "XX" => current.is_some(),
            // A key without a deadline lives forever, so GT can never beat it
            // and LT always does.
            "GT" => current.is_some_and(|cur| at > cur),
            "LT" => current.is_none_or(|cur| at < cur),
            _ => return Err(CommandError::Syntax),
        },
    };

    if !allowed {
        return Ok(Value::Int(0));
    }
    store.set_expiry(key, at);
    Ok(Value::Int(1))
}

fn eval_ttl(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    let [key] = args else {
        return Err(CommandError::WrongArgumentCount("ttl".into()));
    };
    if !store.contains(key) {
        return Ok(Value::Int(-2));
    }
    Ok(match store.expiry_of(key) {
        None => Value::Int(-1),
        Some(at) => {
            let remaining = at.saturating_duration_since(Instant::now());
            Value::Int(remaining.as_secs_f64().round() as i64)
        }
    })
}

fn eval_persist(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    let [key] = args else {
        return Err(CommandError::WrongArgumentCount("persist".into()));
    };
    if !store.contains(key) {
        return Ok(Value::Int(0));
    }
    Ok(Value::Int(store.clear_expiry(key) as i64))
}

/// Internal command produced by decomposing COPY or RENAME: installs the
/// carried source object under the destination key.
fn eval_object_copy(store: &mut ShardStore, cmd: &Command) -> Result<Value, CommandError> {
    let Some(dst) = cmd.args.first() else {
        return Err(CommandError::WrongArgumentCount("copy".into()));
    };
    let Some(carry) = cmd.carry.clone() else {
        return Err(CommandError::Syntax);
    };
    let replace = cmd
        .args
        .iter()
        .skip(1)
        .any(|arg| arg.eq_ignore_ascii_case("REPLACE"));

    if store.contains(dst) && !replace {
        return Ok(Value::Int(0));
    }
    store.put(dst.clone(), carry);
    Ok(Value::Int(1))
}

fn eval_keys(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    let [pattern] = args else {
        return Err(CommandError::WrongArgumentCount("keys".into()));
    };
    let keys = store
        .keys(pattern)
        .into_iter()
        .map(|key| Value::Str(Bytes::from(key)))
        .collect();
    Ok(Value::Array(keys))
}

fn eval_dbsize(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    if !args.is_empty() {
        return Err(CommandError::WrongArgumentCount("dbsize".into()));
    }
    Ok(Value::Int(store.key_count() as i64))
}

fn eval_flushdb(store: &mut ShardStore, args: &[String]) -> Result<Value, CommandError> {
    if !args.is_empty() {
        return Err(CommandError::WrongArgumentCount("flushdb".into()));
    }
    store.clear();
    Ok(Value::Ok)
}

fn expire_duration(cmd: &str, raw: &str, millis: bool) -> Result<Duration, CommandError> {
    let n: i64 = raw.parse().map_err(|_| CommandError::NotAnInteger)?;
    if n <= 0 {
        return Err(CommandError::InvalidExpireTime(cmd.to_string()));
    }
    Ok(if millis {
        Duration::from_millis(n as u64)
    } else {
        Duration::from_secs(n as u64)
    })
}

fn deadline(cmd: &str, duration: Duration) -> Result<Instant, CommandError> {
    Instant::now()
        .checked_add(duration)
        .ok_or_else(|| CommandError::InvalidExpireTime(cmd.to_string()))
}
