//! Multi-Shard Command Decomposition
//!
//! A command touching several keys cannot run on one shard. Before the
//! scatter phase, the worker breaks it into single-shard pieces:
//!
//! ```text
//!   MSET a 1 b 2      →  SET a 1            (shard of "a")
//!                        SET b 2            (shard of "b")
//!   RENAME src dst    →  DEL src            (shard of "src")
//!                        OBJECTCOPY dst     (shard of "dst", object carried)
//!   COPY src dst      →  OBJECTCOPY dst     (shard of "dst", object carried)
//!   KEYS pattern      →  KEYS pattern       (every shard, by index)
//! ```
//!
//! RENAME and COPY consume the value read during preprocessing, attached to
//! the destination piece as a carry object so the bytes reach the other
//! shard unchanged; everything else decomposes from the arguments alone.
//! The position of each piece in the returned vector becomes its sequence
//! number, which is what lets the composer reassemble results in command
//! order.

use bytes::Bytes;

use crate::command::Command;
use crate::ops::CommandError;
use crate::storage::Object;

/// How one decomposed piece finds its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Hash the piece's routing key.
    Key,
    /// Go straight to this shard index.
    Shard(usize),
}

/// One single-shard piece of a larger command.
#[derive(Debug, Clone)]
pub(crate) struct RoutedCommand {
    pub command: Command,
    pub route: Route,
}

impl RoutedCommand {
    fn keyed(command: Command) -> Self {
        Self {
            command,
            route: Route::Key,
        }
    }

    fn on_shard(command: Command, shard: usize) -> Self {
        Self {
            command,
            route: Route::Shard(shard),
        }
    }
}

/// Arity checks that must pass before any preprocessing is dispatched.
pub(crate) fn validate(cmd: &Command) -> Result<(), CommandError> {
    let arity_ok = match cmd.name.as_str() {
        "MSET" => !cmd.args.is_empty() && cmd.args.len() % 2 == 0,
        "MGET" => !cmd.args.is_empty(),
        "RENAME" => cmd.args.len() == 2,
        "COPY" => (2..=3).contains(&cmd.args.len()),
        "KEYS" => cmd.args.len() == 1,
        "DBSIZE" | "FLUSHDB" => cmd.args.is_empty(),
        _ => true,
    };
    if arity_ok {
        Ok(())
    } else {
        Err(CommandError::WrongArgumentCount(cmd.name.to_lowercase()))
    }
}

/// Splits `cmd` into its per-shard pieces.
///
/// `preread` is the source value fetched by preprocessing; only RENAME and
/// COPY use it.
pub(crate) fn decompose(
    cmd: &Command,
    shard_count: usize,
    preread: Option<Bytes>,
) -> Result<Vec<RoutedCommand>, CommandError> {
    match cmd.name.as_str() {
        "MSET" => Ok(cmd
            .args
            .chunks_exact(2)
            .map(|pair| RoutedCommand::keyed(Command::new("SET", pair.to_vec())))
            .collect()),

        "MGET" => Ok(cmd
            .args
            .iter()
            .map(|key| RoutedCommand::keyed(Command::new("GET", vec![key.clone()])))
            .collect()),

        "RENAME" => {
            let value = require_preread(preread)?;
            let src = cmd.args[0].clone();
            let dst = cmd.args[1].clone();
            Ok(vec![
                RoutedCommand::keyed(Command::new("DEL", vec![src])),
                RoutedCommand::keyed(Command::with_carry(
                    "OBJECTCOPY",
                    vec![dst, "REPLACE".to_string()],
                    Object::new(value, 0),
                )),
            ])
        }

        "COPY" => {
            let value = require_preread(preread)?;
            let mut args = vec![cmd.args[1].clone()];
            if let Some(option) = cmd.args.get(2) {
                if !option.eq_ignore_ascii_case("REPLACE") {
                    return Err(CommandError::Syntax);
                }
                args.push(option.clone());
            }
            Ok(vec![RoutedCommand::keyed(Command::with_carry(
                "OBJECTCOPY",
                args,
                Object::new(value, 0),
            ))])
        }

        "KEYS" | "DBSIZE" | "FLUSHDB" => Ok((0..shard_count)
            .map(|shard| RoutedCommand::on_shard(cmd.clone(), shard))
            .collect()),

        other => Err(CommandError::UnknownCommand(other.to_lowercase())),
    }
}

fn require_preread(preread: Option<Bytes>) -> Result<Bytes, CommandError> {
    preread.ok_or_else(|| CommandError::ShardFailure("preprocessing value missing".to_string()))
}
