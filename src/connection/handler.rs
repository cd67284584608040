//! Connection Handler
//!
//! One task per client connection. The handler owns the connection's
//! [`Worker`], reads newline-delimited commands, runs them through the
//! engine and writes back one reply per command.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Engine admission (max-clients check)
//!        │ rejected → error line, close
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │   read line from socket      │
//!    │   parse into Command         │
//!    │   worker.execute(cmd).await  │
//!    │   write reply line           │
//!    └──────────────────────────────┘
//!        │ ABORT / disconnect / error
//!        ▼
//! 4. Worker dropped → slot freed
//! ```
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a BytesMut buffer because TCP is a stream:
//! one read may carry half a command or several complete ones. Lines are
//! split off as they complete; a line that outgrows the buffer cap ends the
//! connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::command::Command;
use crate::engine::Engine;
use crate::ops::{CommandError, Value};
use crate::worker::Worker;

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections turned away at the client limit
    pub connections_rejected: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// This connection's worker, released on drop
    worker: Worker,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        worker: Worker,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            worker,
            stats,
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, worker_id = %self.worker.id(), "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "client disconnected"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(line) = self.next_line() {
                let Some(cmd) = parse_line(&line) else {
                    continue;
                };
                let closing = cmd.name == "ABORT";

                let reply = self.worker.execute(cmd).await;
                self.stats.command_processed();
                self.send_reply(&reply).await?;

                if closing {
                    return Ok(());
                }
            }

            // Need more data - read from the socket
            self.read_more_data().await?;
        }
    }

    /// Splits the next complete line off the buffer, if one has arrived.
    fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line = self.buffer.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        trace!(
            client = %self.addr,
            bytes = line.len(),
            remaining = self.buffer.len(),
            "line received"
        );
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.addr,
                size = self.buffer.len(),
                "line exceeds buffer limit"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            }
            return Err(ConnectionError::UnexpectedEof);
        }

        self.stats.bytes_read(n);
        Ok(())
    }

    /// Writes one reply line (or block, for arrays).
    async fn send_reply(
        &mut self,
        reply: &Result<Value, CommandError>,
    ) -> Result<(), ConnectionError> {
        let text = match reply {
            Ok(value) => value.to_string(),
            Err(err) => format!("ERR {}", err),
        };

        self.stream.write_all(text.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        self.stats.bytes_written(text.len() + 1);
        Ok(())
    }
}

/// Parses one input line into a command. Blank lines yield nothing.
fn parse_line(line: &str) -> Option<Command> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?;
    Some(Command::new(
        name,
        tokens.map(str::to_string).collect(),
    ))
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial line)
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("buffer size limit exceeded")]
    BufferFull,
}

/// Admits the connection against the engine and runs it to completion.
///
/// A connection over the client limit receives one error line and is
/// closed without ever holding a worker.
pub async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    engine: Arc<Engine>,
    stats: Arc<ConnectionStats>,
) {
    let worker = match engine.connect() {
        Ok(worker) => worker,
        Err(err) => {
            warn!(client = %addr, error = %err, "connection rejected");
            stats.connection_rejected();
            let _ = stream.write_all(format!("ERR {}\n", err).as_bytes()).await;
            return;
        }
    };

    let handler = ConnectionHandler::new(stream, addr, worker, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    async fn create_test_server(max_clients: usize) -> (SocketAddr, Arc<Engine>, Arc<ConnectionStats>) {
        let config = Config {
            shard_count: 2,
            max_clients,
            max_keys: 4096,
            ..Config::default()
        };
        let engine = Arc::new(Engine::new(&config).unwrap());
        let stats = Arc::new(ConnectionStats::new());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let engine_clone = Arc::clone(&engine);
        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let engine = Arc::clone(&engine_clone);
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, engine, stats));
            }
        });

        (addr, engine, stats)
    }

    async fn read_line(client: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        client.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server(16).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        client.get_mut().write_all(b"PING\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "PONG");
    }

    #[tokio::test]
    async fn test_set_get_over_socket() {
        let (addr, _, _) = create_test_server(16).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        client.get_mut().write_all(b"SET name rift\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "OK");

        client.get_mut().write_all(b"GET name\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "rift");

        client.get_mut().write_all(b"GET missing\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "(nil)");
    }

    #[tokio::test]
    async fn test_error_replies_as_err_line() {
        let (addr, _, _) = create_test_server(16).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        client.get_mut().write_all(b"GET\n").await.unwrap();
        let line = read_line(&mut client).await;
        assert!(
            line.starts_with("ERR wrong number of arguments"),
            "got: {}",
            line
        );

        client.get_mut().write_all(b"FROB x\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "ERR unknown command 'frob'");
    }

    #[tokio::test]
    async fn test_pipelined_lines_in_one_write() {
        let (addr, _, _) = create_test_server(16).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        client
            .get_mut()
            .write_all(b"SET k1 v1\nSET k2 v2\nGET k1\nGET k2\n")
            .await
            .unwrap();

        assert_eq!(read_line(&mut client).await, "OK");
        assert_eq!(read_line(&mut client).await, "OK");
        assert_eq!(read_line(&mut client).await, "v1");
        assert_eq!(read_line(&mut client).await, "v2");
    }

    #[tokio::test]
    async fn test_abort_acknowledges_then_closes() {
        let (addr, engine, _) = create_test_server(16).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        client.get_mut().write_all(b"ABORT\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "OK");

        // Server side closed: next read sees EOF.
        let mut rest = Vec::new();
        let n = client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(n, 0);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(engine.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_client_over_limit_is_turned_away() {
        let (addr, _, stats) = create_test_server(1).await;

        let mut first = BufReader::new(TcpStream::connect(addr).await.unwrap());
        first.get_mut().write_all(b"PING\n").await.unwrap();
        assert_eq!(read_line(&mut first).await, "PONG");

        let mut second = BufReader::new(TcpStream::connect(addr).await.unwrap());
        let line = read_line(&mut second).await;
        assert_eq!(line, "ERR max clients reached (1)");

        let mut rest = Vec::new();
        assert_eq!(second.read_to_end(&mut rest).await.unwrap(), 0);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(stats.connections_rejected.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server(16).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        client.get_mut().write_all(b"PING\n").await.unwrap();
        let _ = read_line(&mut client).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
