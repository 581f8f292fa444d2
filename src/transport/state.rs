//! Transport state machine.
//!
//! ```text
//! New → Connecting → Connected ⇄ WaitingResponse
//!  │        │            │             │
//!  └────────┴────────────┴─────────────┴──→ Closing → Closed
//! ```
//!
//! Every transition goes through a single watch channel, so a transition
//! is an atomic checkpoint: of two tasks racing to leave a state, exactly
//! one wins.

use std::fmt;

use tokio::sync::watch;

/// Lifecycle state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    WaitingResponse,
    Closing,
    Closed,
}

impl TransportState {
    /// Socket established and reader worker running.
    pub fn is_connected(&self) -> bool {
        matches!(self, TransportState::Connected | TransportState::WaitingResponse)
    }

    /// Not yet on the way down.
    pub fn is_live(&self) -> bool {
        !matches!(self, TransportState::Closing | TransportState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::WaitingResponse => "waiting_response",
            TransportState::Closing => "closing",
            TransportState::Closed => "closed",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of trying to start a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStart {
    /// This caller owns the attempt (state is now `Connecting`).
    Started,
    /// Another task is already connecting.
    InFlight,
    /// Nothing to do.
    AlreadyConnected,
    /// Transport is closing or closed.
    Closed,
}

/// Shared state cell.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<TransportState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TransportState::New);
        Self { tx }
    }

    pub fn get(&self) -> TransportState {
        *self.tx.borrow()
    }

    /// Move `from` → `to`. Returns false if the state was not `from`.
    pub fn transition(&self, from: TransportState, to: TransportState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Run `f` under the state lock. `f` returns whether it changed the state.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut TransportState) -> bool,
    {
        self.tx.send_if_modified(f)
    }

    pub fn begin_connect(&self) -> ConnectStart {
        let mut start = ConnectStart::Closed;
        self.tx.send_if_modified(|state| match *state {
            TransportState::New => {
                *state = TransportState::Connecting;
                start = ConnectStart::Started;
                true
            }
            TransportState::Connecting => {
                start = ConnectStart::InFlight;
                false
            }
            TransportState::Connected | TransportState::WaitingResponse => {
                start = ConnectStart::AlreadyConnected;
                false
            }
            TransportState::Closing | TransportState::Closed => false,
        });
        start
    }

    /// Claim the teardown. Returns the state that was left, or `None` if
    /// another caller already claimed it.
    pub fn begin_close(&self) -> Option<TransportState> {
        let mut previous = None;
        self.tx.send_if_modified(|state| {
            if state.is_live() {
                previous = Some(*state);
                *state = TransportState::Closing;
                true
            } else {
                false
            }
        });
        previous
    }

    pub fn finish_close(&self) {
        self.transition(TransportState::Closing, TransportState::Closed);
    }

    /// Wait until `pred` holds for the current state.
    pub async fn wait_for<P>(&self, pred: P) -> TransportState
    where
        P: FnMut(&TransportState) -> bool,
    {
        let mut rx = self.tx.subscribe();
        // Bound to a local so the borrowed `Ref` ends before `rx` drops.
        #[allow(clippy::let_and_return)]
        let state = match rx.wait_for(pred).await {
            Ok(state) => *state,
            // The sender lives in `self`, so this cannot close while borrowed.
            Err(_) => self.get(),
        };
        state
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_connect_lifecycle() {
        let cell = StateCell::new();
        assert_eq!(cell.begin_connect(), ConnectStart::Started);
        assert_eq!(cell.begin_connect(), ConnectStart::InFlight);
        assert!(cell.transition(TransportState::Connecting, TransportState::Connected));
        assert_eq!(cell.begin_connect(), ConnectStart::AlreadyConnected);
        assert!(!cell.transition(TransportState::Connecting, TransportState::Connected));
    }

    #[test]
    fn test_close_claimed_once() {
        let cell = StateCell::new();
        assert_eq!(cell.begin_close(), Some(TransportState::New));
        assert_eq!(cell.begin_close(), None);
        assert_eq!(cell.begin_connect(), ConnectStart::Closed);
        cell.finish_close();
        assert_eq!(cell.get(), TransportState::Closed);
        assert_eq!(cell.begin_close(), None);
    }

    #[test]
    fn test_concurrent_close_has_one_winner() {
        let cell = Arc::new(StateCell::new());
        cell.begin_connect();
        cell.transition(TransportState::Connecting, TransportState::Connected);

        let winners: usize = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || cell.begin_close().is_some())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_wait_for_closed() {
        let cell = Arc::new(StateCell::new());
        cell.begin_close();

        let waiter = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move { cell.wait_for(|s| *s == TransportState::Closed).await })
        };
        tokio::task::yield_now().await;
        cell.finish_close();

        assert_eq!(waiter.await.unwrap(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_wait_for_already_satisfied() {
        let cell = StateCell::new();
        assert_eq!(cell.wait_for(|s| *s == TransportState::New).await, TransportState::New);
    }
}
