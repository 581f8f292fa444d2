//! Client-side transport manager for a remote file-sharing protocol.
//!
//! Connects to server endpoints under tiered timeouts (connect, response,
//! idle socket read), runs one supervised reader worker per live
//! connection, and reports failures as typed, cause-carrying errors.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod transport;

pub use config::{TimeoutOverrides, TimeoutProvider, Timeouts, TransportConfig};
pub use error::{ErrorKind, TransportError, TransportResult};
pub use lifecycle::{WorkerSupervisor, WORKER_NAME_PREFIX};
pub use net::Endpoint;
pub use transport::{Transport, TransportManager, TransportState};
