//! Operation and Response Envelopes
//!
//! Workers and shards never call each other directly; they exchange messages.
//! A [`StoreOp`] travels from a worker to the shard that owns the routed key,
//! and a [`StoreResponse`] travels back through the worker's response router.
//! Both carry the correlation IDs needed to pair them up:
//!
//! ```text
//!   Worker ──── StoreOp { request_id, seq_id, ... } ────▶ Shard
//!   Worker ◀─── StoreResponse { request_id, seq_id } ──── Shard
//! ```
//!
//! `request_id` identifies the client request (one fan-out shares a single
//! request ID across all its pieces) while `seq_id` preserves the position of
//! each piece so multi-shard results can be reassembled in order.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::command::Command;

/// A command routed to one shard for execution.
#[derive(Debug, Clone)]
pub struct StoreOp {
    /// Position of this operation within its parent request. Single-shard
    /// requests use 0; fan-out pieces number themselves so the composer can
    /// restore order.
    pub seq_id: usize,
    /// Correlation ID shared by every piece of one client request.
    pub request_id: u32,
    /// The command to evaluate against the shard's store.
    pub command: Command,
    /// ID of the worker awaiting the response.
    pub worker_id: String,
    /// Index of the destination shard.
    pub shard_id: usize,
    /// True when this is a preprocessing read (the gather phase for the
    /// request proper has not started yet). Responses to preprocessing ops
    /// are delivered to a separate waiter class.
    pub pre_processing: bool,
}

/// The shard's answer to one [`StoreOp`].
#[derive(Debug, Clone)]
pub struct StoreResponse {
    /// Copied from the originating operation.
    pub seq_id: usize,
    /// Copied from the originating operation.
    pub request_id: u32,
    /// The evaluation outcome.
    pub result: Result<Value, CommandError>,
}

/// A successful command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The simple "OK" acknowledgement.
    Ok,
    /// Absence of a value (missed lookup, skipped conditional write).
    Nil,
    /// A signed integer reply.
    Int(i64),
    /// A binary-safe string reply.
    Str(Bytes),
    /// An ordered list of replies.
    Array(Vec<Value>),
}

impl Value {
    /// Builds a string reply from anything that converts into [`Bytes`].
    pub fn from_str_bytes(bytes: impl Into<Bytes>) -> Self {
        Value::Str(bytes.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Ok => write!(f, "OK"),
            Value::Nil => write!(f, "(nil)"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                if items.is_empty() {
                    write!(f, "(empty array)")?;
                }
                Ok(())
            }
        }
    }
}

/// Errors produced while validating or evaluating a command.
///
/// These are client-visible: the connection layer renders them as `ERR`
/// lines. They are also values, not failures of the engine itself, which is
/// why [`StoreResponse`] carries them inside its `result` rather than
/// aborting anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("no such key")]
    NoSuchKey,

    #[error("syntax error")]
    Syntax,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("operation timed out")]
    Timeout,

    /// The owning shard panicked while evaluating the operation. The panic is
    /// contained per-operation; the shard keeps serving.
    #[error("shard execution failed: {0}")]
    ShardFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Ok.to_string(), "OK");
        assert_eq!(Value::Nil.to_string(), "(nil)");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::from_str_bytes("hello").to_string(), "hello");
    }

    #[test]
    fn test_array_display_numbers_items() {
        let v = Value::Array(vec![
            Value::from_str_bytes("a"),
            Value::Nil,
            Value::Int(2),
        ]);
        assert_eq!(v.to_string(), "1) a\n2) (nil)\n3) 2");
        assert_eq!(Value::Array(vec![]).to_string(), "(empty array)");
    }

    #[test]
    fn test_error_messages_are_client_shaped() {
        assert_eq!(
            CommandError::WrongArgumentCount("set".into()).to_string(),
            "wrong number of arguments for 'set' command"
        );
        assert_eq!(CommandError::NoSuchKey.to_string(), "no such key");
        assert_eq!(
            CommandError::InvalidExpireTime("getex".into()).to_string(),
            "invalid expire time in 'getex' command"
        );
    }
}
