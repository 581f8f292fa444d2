//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Durations are stored as milliseconds on disk.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::codec::FRAME_HEADER_LEN;

/// Root configuration for the transport layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    /// Timeout bounds for connect, response wait and idle socket reads.
    pub timeouts: TimeoutConfig,

    /// Worker and framing settings.
    pub transport: WorkerConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Timeout configuration. A value of zero disables the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Wait for a correlated reply after a request is written, in milliseconds.
    pub response_ms: u64,

    /// Single idle socket read timeout in milliseconds.
    pub socket_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 35_000,
            response_ms: 30_000,
            socket_ms: 35_000,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn response(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }

    pub fn socket(&self) -> Duration {
        Duration::from_millis(self.socket_ms)
    }
}

/// Per-transport worker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long `close` waits for a reader worker to exit before aborting it.
    pub worker_grace_ms: u64,

    /// Largest accepted frame (header included) in bytes.
    pub max_frame_size: usize,

    /// Close the transport when an idle read times out with nothing pending.
    pub close_when_idle: bool,

    /// Payload of the negotiation request sent on every connect. The
    /// transport is connected only once the server answers it.
    pub negotiate_request: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_grace_ms: 1_000,
            max_frame_size: 65_536 + FRAME_HEADER_LEN,
            close_when_idle: false,
            negotiate_request: "NEGOTIATE".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn worker_grace(&self) -> Duration {
        Duration::from_millis(self.worker_grace_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
