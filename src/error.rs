//! Typed transport errors.
//!
//! Every failure the transport manager surfaces to callers is a
//! [`TransportError`] whose [`ErrorKind`] tells the phase of failure.
//! Low-level causes (socket errors, elapsed timers) are kept as the
//! error source so callers can inspect them without matching strings.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Boxed low-level cause, as accepted by the constructors.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared cause, so copies handed to several waiters keep the typed value.
type SharedCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of failure kinds surfaced by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection establishment (including negotiation) exceeded its bound.
    ConnectionTimeout,
    /// No correlated reply arrived within the response bound.
    ResponseTimeout,
    /// A single blocking read on an idle socket exceeded the socket bound.
    SocketReadTimeout,
    /// Any other I/O failure.
    GeneralIo,
}

impl ErrorKind {
    /// Stable label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionTimeout => "connection_timeout",
            ErrorKind::ResponseTimeout => "response_timeout",
            ErrorKind::SocketReadTimeout => "socket_read_timeout",
            ErrorKind::GeneralIo => "general_io",
        }
    }

    /// Whether this kind was produced by a timeout bound.
    pub fn is_timeout(&self) -> bool {
        !matches!(self, ErrorKind::GeneralIo)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced by the transport manager.
///
/// Cloning is cheap and clones share the same cause.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<SharedCause>,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// Create an error without a lower-level cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping a lower-level cause.
    pub fn with_cause<E>(kind: ErrorKind, message: impl Into<String>, cause: E) -> Self
    where
        E: Into<Cause>,
    {
        let cause: Cause = cause.into();
        Self {
            kind,
            message: message.into(),
            source: Some(Arc::from(cause)),
        }
    }

    pub fn connection_timeout<E: Into<Cause>>(message: impl Into<String>, cause: E) -> Self {
        Self::with_cause(ErrorKind::ConnectionTimeout, message, cause)
    }

    pub fn response_timeout<E: Into<Cause>>(message: impl Into<String>, cause: E) -> Self {
        Self::with_cause(ErrorKind::ResponseTimeout, message, cause)
    }

    pub fn socket_read_timeout<E: Into<Cause>>(message: impl Into<String>, cause: E) -> Self {
        Self::with_cause(ErrorKind::SocketReadTimeout, message, cause)
    }

    pub fn io(message: impl Into<String>, cause: std::io::Error) -> Self {
        Self::with_cause(ErrorKind::GeneralIo, message, cause)
    }

    /// The failure kind. Callers branch on this.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable context, without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wrapped lower-level cause, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Whether the wrapped cause is of type `E`.
    pub fn cause_is<E: std::error::Error + 'static>(&self) -> bool {
        self.cause().map(|c| c.is::<E>()).unwrap_or(false)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::io("I/O failure", err)
    }
}
