//! Timeout providers.
//!
//! A provider is a read-only view of the three timeout bounds. Per-call
//! overrides wrap a base provider instead of mutating it, so every other
//! holder of the base keeps seeing the original values.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::TimeoutConfig;

/// Supplies the timeout bounds for one operation context.
///
/// A zero duration means the phase is unbounded.
pub trait TimeoutProvider: Debug + Send + Sync {
    /// Bound on establishing the connection (including negotiation).
    fn connect_timeout(&self) -> Duration;
    /// Bound on waiting for a correlated reply.
    fn response_timeout(&self) -> Duration;
    /// Bound on a single idle socket read.
    fn socket_timeout(&self) -> Duration;
}

/// Immutable timeout value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub response: Duration,
    pub socket: Duration,
}

impl Timeouts {
    pub fn new(connect: Duration, response: Duration, socket: Duration) -> Self {
        Self {
            connect,
            response,
            socket,
        }
    }

    /// Snapshot any provider into a plain value.
    pub fn from_provider(provider: &dyn TimeoutProvider) -> Self {
        Self {
            connect: provider.connect_timeout(),
            response: provider.response_timeout(),
            socket: provider.socket_timeout(),
        }
    }

    /// Build a new value with the set fields of `overrides` substituted.
    pub fn merge(&self, overrides: &TimeoutOverrides) -> Self {
        Self {
            connect: overrides.connect.unwrap_or(self.connect),
            response: overrides.response.unwrap_or(self.response),
            socket: overrides.socket.unwrap_or(self.socket),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(TimeoutConfig::default())
    }
}

impl From<TimeoutConfig> for Timeouts {
    fn from(config: TimeoutConfig) -> Self {
        Self {
            connect: config.connect(),
            response: config.response(),
            socket: config.socket(),
        }
    }
}

impl TimeoutProvider for Timeouts {
    fn connect_timeout(&self) -> Duration {
        self.connect
    }

    fn response_timeout(&self) -> Duration {
        self.response
    }

    fn socket_timeout(&self) -> Duration {
        self.socket
    }
}

impl TimeoutProvider for TimeoutConfig {
    fn connect_timeout(&self) -> Duration {
        self.connect()
    }

    fn response_timeout(&self) -> Duration {
        self.response()
    }

    fn socket_timeout(&self) -> Duration {
        self.socket()
    }
}

/// Explicit per-field overrides. Unset fields fall through to the base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutOverrides {
    pub connect: Option<Duration>,
    pub response: Option<Duration>,
    pub socket: Option<Duration>,
}

impl TimeoutOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(mut self, value: Duration) -> Self {
        self.connect = Some(value);
        self
    }

    pub fn response(mut self, value: Duration) -> Self {
        self.response = Some(value);
        self
    }

    pub fn socket(mut self, value: Duration) -> Self {
        self.socket = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.connect.is_none() && self.response.is_none() && self.socket.is_none()
    }
}

/// Provider that delegates to a base provider for unset fields.
#[derive(Debug, Clone)]
pub struct DelegatingTimeouts {
    base: Arc<dyn TimeoutProvider>,
    overrides: TimeoutOverrides,
}

impl DelegatingTimeouts {
    pub fn new(base: Arc<dyn TimeoutProvider>, overrides: TimeoutOverrides) -> Self {
        Self { base, overrides }
    }

    pub fn base(&self) -> &Arc<dyn TimeoutProvider> {
        &self.base
    }

    pub fn overrides(&self) -> TimeoutOverrides {
        self.overrides
    }
}

impl TimeoutProvider for DelegatingTimeouts {
    fn connect_timeout(&self) -> Duration {
        self.overrides
            .connect
            .unwrap_or_else(|| self.base.connect_timeout())
    }

    fn response_timeout(&self) -> Duration {
        self.overrides
            .response
            .unwrap_or_else(|| self.base.response_timeout())
    }

    fn socket_timeout(&self) -> Duration {
        self.overrides
            .socket
            .unwrap_or_else(|| self.base.socket_timeout())
    }
}
