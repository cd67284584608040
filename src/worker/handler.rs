//! Worker Execution Pipeline
//!
//! One [`Worker`] serves one client connection. It never touches a store
//! directly; it turns commands into operations, sends them to the owning
//! shards, and waits on its response router for the answers.
//!
//! Single-shard commands are a one-hop round trip. Multi-shard commands run
//! the full pipeline:
//!
//! ```text
//!   preprocess ──▶ decompose ──▶ scatter ──▶ gather ──▶ compose
//!   (read the     (split into   (dispatch   (await N    (fold into
//!    source value  per-shard     each to     replies,    one client
//!    if needed)    pieces)       its shard)  one timer)  reply)
//! ```
//!
//! Every phase that waits does so under the worker's response timeout.
//! A timeout abandons the pending entry; responses that arrive afterwards
//! are discarded by the router, so a slow shard can delay one client but
//! can never wedge the engine.

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::command::{Command, CommandKind};
use crate::ident::IdGenerator;
use crate::ops::{CommandError, StoreOp, StoreResponse, Value};
use crate::shard::{PendingTicket, ResponseRouter, ShardManager, WaiterKind};
use crate::worker::compose::compose;
use crate::worker::decompose::{self, Route};
use crate::worker::manager::WorkerManager;

/// Executes commands on behalf of one client connection.
///
/// Dropping the worker releases its slot and its response router; shards
/// drop any responses still in flight for it.
#[derive(Debug)]
pub struct Worker {
    id: String,
    actor: u32,
    ids: Arc<IdGenerator>,
    shards: Arc<ShardManager>,
    router: Arc<ResponseRouter>,
    response_timeout: Duration,
    manager: Arc<WorkerManager>,
}

impl Worker {
    pub(crate) fn new(
        id: String,
        actor: u32,
        ids: Arc<IdGenerator>,
        shards: Arc<ShardManager>,
        router: Arc<ResponseRouter>,
        response_timeout: Duration,
        manager: Arc<WorkerManager>,
    ) -> Self {
        Self {
            id,
            actor,
            ids,
            shards,
            router,
            response_timeout,
            manager,
        }
    }

    /// This worker's unique ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs one command to completion and returns the client-facing reply.
    pub async fn execute(&self, cmd: Command) -> Result<Value, CommandError> {
        let Some(kind) = cmd.kind() else {
            return Err(CommandError::UnknownCommand(cmd.name.to_lowercase()));
        };

        match kind {
            CommandKind::Global => execute_global(&cmd),
            // ABORT: acknowledged here, acted on by the connection layer.
            CommandKind::Custom => Ok(Value::Ok),
            CommandKind::SingleShard => self.execute_single(cmd).await,
            CommandKind::MultiShard | CommandKind::AllShard => self.execute_fanout(cmd).await,
        }
    }

    async fn execute_single(&self, cmd: Command) -> Result<Value, CommandError> {
        let request_id = self.ids.next_id(self.actor);
        let mut ticket = self.router.register(request_id, WaiterKind::Response);

        let shard_id = self.shards.owner_of(cmd.routing_key());
        let op = StoreOp {
            seq_id: 0,
            request_id,
            command: cmd,
            worker_id: self.id.clone(),
            shard_id,
            pre_processing: false,
        };
        self.dispatch(op).await?;

        let response = self.await_one(&mut ticket).await?;
        response.result
    }

    async fn execute_fanout(&self, cmd: Command) -> Result<Value, CommandError> {
        decompose::validate(&cmd)?;

        let preread = match cmd.name.as_str() {
            "RENAME" | "COPY" => Some(self.preprocess(&cmd).await?),
            _ => None,
        };

        let pieces = decompose::decompose(&cmd, self.shards.shard_count(), preread)?;
        let expected = pieces.len();

        // All pieces share one request ID; their position is the sequence
        // number the composer sorts by.
        let request_id = self.ids.next_id(self.actor);
        let mut ticket = self.router.register(request_id, WaiterKind::Response);

        for (seq_id, piece) in pieces.into_iter().enumerate() {
            let shard_id = match piece.route {
                Route::Key => self.shards.owner_of(piece.command.routing_key()),
                Route::Shard(index) => index,
            };
            let op = StoreOp {
                seq_id,
                request_id,
                command: piece.command,
                worker_id: self.id.clone(),
                shard_id,
                pre_processing: false,
            };
            self.dispatch(op).await?;
        }

        let responses = self.gather(&mut ticket, expected).await?;
        compose(&cmd.name, responses)
    }

    /// Reads the source value a RENAME or COPY needs before it can scatter.
    async fn preprocess(&self, cmd: &Command) -> Result<Bytes, CommandError> {
        let request_id = self.ids.next_id(self.actor);
        let mut ticket = self.router.register(request_id, WaiterKind::Preprocessing);

        let op = StoreOp {
            seq_id: 0,
            request_id,
            command: cmd.clone(),
            worker_id: self.id.clone(),
            shard_id: self.shards.owner_of(cmd.routing_key()),
            pre_processing: true,
        };
        self.dispatch(op).await?;

        let response = self.await_one(&mut ticket).await?;
        match response.result? {
            Value::Str(bytes) => Ok(bytes),
            _ => Err(CommandError::NoSuchKey),
        }
    }

    async fn dispatch(&self, op: StoreOp) -> Result<(), CommandError> {
        self.shards
            .dispatch(op)
            .await
            .map_err(|err| CommandError::ShardFailure(err.to_string()))
    }

    /// Waits for a single response under the worker timeout.
    async fn await_one(&self, ticket: &mut PendingTicket) -> Result<StoreResponse, CommandError> {
        match timeout(self.response_timeout, ticket.recv()).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(CommandError::ShardFailure(
                "response channel closed".to_string(),
            )),
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Collects `expected` responses under one shared timeout.
    async fn gather(
        &self,
        ticket: &mut PendingTicket,
        expected: usize,
    ) -> Result<Vec<StoreResponse>, CommandError> {
        let mut responses = Vec::with_capacity(expected);
        let outcome = timeout(self.response_timeout, async {
            while responses.len() < expected {
                match ticket.recv().await {
                    Some(response) => responses.push(response),
                    None => break,
                }
            }
        })
        .await;

        match outcome {
            Ok(()) if responses.len() == expected => Ok(responses),
            Ok(()) => Err(CommandError::ShardFailure(
                "response channel closed".to_string(),
            )),
            Err(_) => Err(CommandError::Timeout),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.manager.release(&self.id);
        debug!(worker_id = %self.id, "worker released");
    }
}

fn execute_global(cmd: &Command) -> Result<Value, CommandError> {
    match cmd.name.as_str() {
        "PING" => match cmd.args.len() {
            0 => Ok(Value::from_str_bytes("PONG")),
            1 => Ok(Value::from_str_bytes(cmd.args[0].clone())),
            _ => Err(CommandError::WrongArgumentCount("ping".to_string())),
        },
        other => Err(CommandError::UnknownCommand(other.to_lowercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, args: &[&str]) -> Command {
        Command::new(name, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_ping() {
        assert_eq!(
            execute_global(&cmd("PING", &[])),
            Ok(Value::from_str_bytes("PONG"))
        );
        assert_eq!(
            execute_global(&cmd("PING", &["hello"])),
            Ok(Value::from_str_bytes("hello"))
        );
        assert_eq!(
            execute_global(&cmd("PING", &["a", "b"])),
            Err(CommandError::WrongArgumentCount("ping".to_string()))
        );
    }
}
