//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request
//!     → codec.rs (frame: length + exchange id + opaque payload)
//!     → socket owned by the transport
//!
//! Incoming bytes (reader worker)
//!     → codec.rs via FramedRead (buffered decode, survives read timeouts)
//!     → exchange table (correlate by id)
//! ```
//!
//! # Design Decisions
//! - Payloads are opaque; only the exchange id is interpreted
//! - Framing goes through tokio-util codecs so a timed-out read never loses bytes
//! - Hostname resolution happens inside the connect bound

pub mod codec;
pub mod connection;

pub use codec::{ExchangeCodec, Frame};
pub use connection::{Endpoint, TransportId};
