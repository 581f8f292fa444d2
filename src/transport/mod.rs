//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! client operation
//!     → manager.rs acquire(endpoint)       pooled Transport (New)
//!     → manager.rs connect(transport)      bounded TCP connect + negotiation
//!         → lifecycle supervisor spawns worker.rs reader
//!     → manager.rs send(transport, bytes)  exchange.rs slot, bounded wait
//!         ← worker.rs delivers correlated reply
//!     → manager.rs close(transport)        conn.rs teardown, worker awaited
//! ```
//!
//! # Design Decisions
//! - state.rs transitions are the only synchronisation point for lifecycle
//! - Exactly one outcome per connect/send; losing racers are discarded
//! - Socket-read expiry inside the worker is not fatal by default

mod conn;
pub mod exchange;
pub mod manager;
pub mod state;
mod worker;

pub use conn::Transport;
pub use manager::TransportManager;
pub use state::TransportState;
