//! Command Representation and Classification
//!
//! A [`Command`] is the parsed form of one client instruction: an uppercase
//! name plus its raw string arguments. Before execution, every command is
//! classified by [`CommandKind`], which tells the worker how to run it:
//!
//! - **Global**: answered by the worker itself, no shard involved.
//! - **SingleShard**: routed whole to the shard owning the routing key.
//! - **MultiShard**: decomposed into per-shard pieces, scattered, gathered,
//!   and composed back into one reply.
//! - **AllShard**: fanned out to every shard regardless of keys.
//! - **Custom**: control-plane behavior handled outside the data path.
//!
//! The routing key is the first argument when present, otherwise the command
//! name itself, so keyless commands still hash to a stable shard.

use crate::storage::object::Object;

/// A parsed client command.
#[derive(Debug, Clone)]
pub struct Command {
    /// Uppercase command name, e.g. `SET`.
    pub name: String,
    /// Positional arguments exactly as the client sent them.
    pub args: Vec<String>,
    /// A stored object piggybacked on internally generated commands. Used by
    /// the copy pipeline to hand the source object to the destination shard.
    pub carry: Option<Object>,
}

impl Command {
    /// Creates a command, normalizing the name to uppercase.
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
            carry: None,
        }
    }

    /// Creates a command that carries a stored object.
    pub fn with_carry(name: impl Into<String>, args: Vec<String>, carry: Object) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
            carry: Some(carry),
        }
    }

    /// The key this command is routed by: its first argument, or the command
    /// name when it has no arguments.
    #[inline]
    pub fn routing_key(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or(&self.name)
    }

    /// Classification of this command, or `None` when the name is unknown.
    #[inline]
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::of(&self.name)
    }
}

/// How a command is executed across the shard set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Handled by the worker without touching any shard.
    Global,
    /// Sent whole to exactly one shard.
    SingleShard,
    /// Split into keyed pieces that may land on several shards.
    MultiShard,
    /// Broadcast to every shard by index.
    AllShard,
    /// Control behavior implemented by the connection layer.
    Custom,
}

impl CommandKind {
    /// Looks up the classification for an uppercase command name.
    ///
    /// Internal piece commands (OBJECTCOPY) are deliberately absent: they
    /// only ever travel inside decomposed operations, so a client typing
    /// one gets an unknown-command error.
    pub fn of(name: &str) -> Option<CommandKind> {
        let kind = match name {
            "PING" => CommandKind::Global,
            "SET" | "GET" | "DEL" | "GETDEL" | "GETEX" | "EXPIRE" | "TTL" | "PERSIST" => {
                CommandKind::SingleShard
            }
            "MSET" | "MGET" | "RENAME" | "COPY" => CommandKind::MultiShard,
            "KEYS" | "DBSIZE" | "FLUSHDB" => CommandKind::AllShard,
            "ABORT" => CommandKind::Custom,
            _ => return None,
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, args: &[&str]) -> Command {
        Command::new(name, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_name_is_uppercased() {
        assert_eq!(cmd("set", &["k", "v"]).name, "SET");
    }

    #[test]
    fn test_classification() {
        assert_eq!(cmd("PING", &[]).kind(), Some(CommandKind::Global));
        assert_eq!(cmd("GET", &["k"]).kind(), Some(CommandKind::SingleShard));
        assert_eq!(cmd("MSET", &["a", "1"]).kind(), Some(CommandKind::MultiShard));
        assert_eq!(cmd("RENAME", &["a", "b"]).kind(), Some(CommandKind::MultiShard));
        assert_eq!(cmd("KEYS", &["*"]).kind(), Some(CommandKind::AllShard));
        assert_eq!(cmd("ABORT", &[]).kind(), Some(CommandKind::Custom));
        assert_eq!(cmd("WIBBLE", &[]).kind(), None);
    }

    #[test]
    fn test_internal_piece_command_not_client_visible() {
        assert_eq!(cmd("OBJECTCOPY", &["dst"]).kind(), None);
    }

    #[test]
    fn test_routing_key_falls_back_to_name() {
        assert_eq!(cmd("GET", &["user:1"]).routing_key(), "user:1");
        assert_eq!(cmd("DBSIZE", &[]).routing_key(), "DBSIZE");
    }
}
