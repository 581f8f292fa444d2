//! Request/response correlation.
//!
//! Each outstanding request owns one slot keyed by its exchange id. A slot
//! is resolved at most once: whoever removes it first (the reader worker
//! delivering a reply, the caller timing out, or close failing everything)
//! decides the outcome, and the loser's value is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{TransportError, TransportResult};

/// Exchange id reserved for connect-phase negotiation.
pub const NEGOTIATE_EXCHANGE_ID: u64 = 0;

type Reply = TransportResult<Vec<u8>>;

/// Table of pending exchanges for one transport.
#[derive(Debug)]
pub struct ExchangeTable {
    pending: DashMap<u64, oneshot::Sender<Reply>>,
    next_id: AtomicU64,
}

impl ExchangeTable {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(NEGOTIATE_EXCHANGE_ID + 1),
        }
    }

    /// Register a new exchange. Returns its id and the reply receiver.
    pub fn register(&self) -> (u64, oneshot::Receiver<Reply>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Deliver a reply. Returns false if the exchange is unknown (never
    /// registered, already timed out, or already resolved).
    pub fn dispatch(&self, id: u64, payload: Vec<u8>) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(Ok(payload)).is_ok(),
            None => false,
        }
    }

    /// Drop an exchange without resolving it. Returns whether it was pending.
    pub fn cancel(&self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Resolve every pending exchange with a clone of `error`.
    pub fn fail_all(&self, error: &TransportError) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for ExchangeTable {
    fn default() -> Self {
        Self::new()
    }
}
