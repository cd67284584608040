//! Response Routing
//!
//! Shards answer operations asynchronously, so something has to match each
//! [`StoreResponse`] back to the task waiting for it. Every worker owns a
//! [`ResponseRouter`]: a guarded table of pending request IDs, each mapped to
//! the channel of the waiter that registered it.
//!
//! ```text
//!   Worker                         ResponseRouter            Shard
//!     │ register(request_id) ───────▶ pending ◀─── deliver(response)
//!     │        ▼                        │
//!     │   PendingTicket ◀── channel ────┘
//!     ▼
//!   ticket.recv().await
//! ```
//!
//! The contract that keeps shards healthy: delivery never blocks. If nobody
//! is waiting for a response (the waiter timed out and dropped its ticket),
//! the response is logged and discarded. Dropping a [`PendingTicket`] always
//! removes its table entry, so abandoned requests cannot leak.
//!
//! Preprocessing reads and regular responses are distinct waiter classes. A
//! response is delivered only to a waiter of the matching class; a mismatch
//! means the IDs collided or a shard answered out of band, and the response
//! is dropped rather than handed to the wrong phase of a pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ops::StoreResponse;

/// Which pipeline phase a pending entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterKind {
    /// Waiting for the response to the request proper.
    Response,
    /// Waiting for a preprocessing read that precedes the request proper.
    Preprocessing,
}

#[derive(Debug)]
struct PendingEntry {
    kind: WaiterKind,
    tx: mpsc::UnboundedSender<StoreResponse>,
}

/// Per-worker table of in-flight request IDs.
#[derive(Debug, Default)]
pub struct ResponseRouter {
    pending: Mutex<HashMap<u32, PendingEntry>>,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Registers interest in `request_id` and returns the ticket to await.
    ///
    /// One fan-out request registers a single ticket; every piece shares the
    /// request ID and all their responses queue on the same channel.
    pub fn register(self: &Arc<Self>, request_id: u32, kind: WaiterKind) -> PendingTicket {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .pending
            .lock()
            .unwrap()
            .insert(request_id, PendingEntry { kind, tx });
        if previous.is_some() {
            warn!(request_id, "pending entry replaced; request id reused while live");
        }

        PendingTicket {
            router: Arc::clone(self),
            request_id,
            rx,
        }
    }

    /// Hands a shard response to its waiter. Returns whether a waiter of the
    /// right class was found.
    ///
    /// Never blocks: the waiter's channel is unbounded, and a missing or
    /// mismatched waiter just drops the response.
    pub fn deliver(&self, pre_processing: bool, response: StoreResponse) -> bool {
        let expected = if pre_processing {
            WaiterKind::Preprocessing
        } else {
            WaiterKind::Response
        };

        let pending = self.pending.lock().unwrap();
        match pending.get(&response.request_id) {
            Some(entry) if entry.kind == expected => entry.tx.send(response).is_ok(),
            Some(entry) => {
                warn!(
                    request_id = response.request_id,
                    ?expected,
                    actual = ?entry.kind,
                    "response class mismatch; dropping"
                );
                false
            }
            None => {
                debug!(
                    request_id = response.request_id,
                    "no waiter for response; dropping"
                );
                false
            }
        }
    }

    /// Number of requests currently awaiting responses.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn remove(&self, request_id: u32) {
        self.pending.lock().unwrap().remove(&request_id);
    }
}

/// A single-shot handle to the responses for one registered request ID.
///
/// Dropping the ticket deregisters the ID, so a waiter that gives up (for
/// example on timeout) leaves nothing behind; late responses are discarded
/// by the router.
#[derive(Debug)]
pub struct PendingTicket {
    router: Arc<ResponseRouter>,
    request_id: u32,
    rx: mpsc::UnboundedReceiver<StoreResponse>,
}

impl PendingTicket {
    /// Waits for the next response to this request.
    pub async fn recv(&mut self) -> Option<StoreResponse> {
        self.rx.recv().await
    }

    /// The request ID this ticket is registered under.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.router.remove(self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Value;
    use tokio::time::{timeout, Duration};

    fn response(request_id: u32, seq_id: usize) -> StoreResponse {
        StoreResponse {
            seq_id,
            request_id,
            result: Ok(Value::Ok),
        }
    }

    #[tokio::test]
    async fn test_deliver_reaches_registered_waiter() {
        let router = Arc::new(ResponseRouter::new());
        let mut ticket = router.register(42, WaiterKind::Response);

        assert!(router.deliver(false, response(42, 0)));

        let got = ticket.recv().await.unwrap();
        assert_eq!(got.request_id, 42);
    }

    #[tokio::test]
    async fn test_fanout_responses_queue_on_one_ticket() {
        let router = Arc::new(ResponseRouter::new());
        let mut ticket = router.register(7, WaiterKind::Response);

        for seq in 0..4 {
            assert!(router.deliver(false, response(7, seq)));
        }

        let mut seqs: Vec<usize> = Vec::new();
        for _ in 0..4 {
            seqs.push(ticket.recv().await.unwrap().seq_id);
        }
        seqs.sort_unstable();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unregistered_response_is_dropped() {
        let router = Arc::new(ResponseRouter::new());
        assert!(!router.deliver(false, response(9, 0)));
    }

    #[tokio::test]
    async fn test_class_mismatch_is_dropped() {
        let router = Arc::new(ResponseRouter::new());
        let mut ticket = router.register(5, WaiterKind::Preprocessing);

        // Regular response arriving for a preprocessing waiter: discarded.
        assert!(!router.deliver(false, response(5, 0)));

        // The matching class still gets through.
        assert!(router.deliver(true, response(5, 0)));
        assert!(ticket.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_ticket_cleans_table_and_late_reply_is_discarded() {
        let router = Arc::new(ResponseRouter::new());

        let mut ticket = router.register(11, WaiterKind::Response);
        assert_eq!(router.pending_count(), 1);

        // Waiter gives up before anything arrives.
        let waited = timeout(Duration::from_millis(10), ticket.recv()).await;
        assert!(waited.is_err());
        drop(ticket);
        assert_eq!(router.pending_count(), 0);

        // The late reply finds no waiter and vanishes without a panic.
        assert!(!router.deliver(false, response(11, 0)));
    }
}
