//! Endpoint addressing and transport identity.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for transport IDs.
/// Relaxed ordering is enough; we only need uniqueness.
static TRANSPORT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl TransportId {
    /// Generate a new unique transport ID.
    pub fn new() -> Self {
        Self(TRANSPORT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// A server endpoint: host name or address plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Error returned when an endpoint string is not `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid endpoint '{0}', expected host:port")]
pub struct EndpointParseError(String);

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointParseError(s.to_string()))?;
        if host.is_empty() {
            return Err(EndpointParseError(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_id_unique() {
        let id1 = TransportId::new();
        let id2 = TransportId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("transport-"));
    }

    #[test]
    fn endpoint_parse_and_display() {
        let ep: Endpoint = "10.255.255.1:139".parse().unwrap();
        assert_eq!(ep.host(), "10.255.255.1");
        assert_eq!(ep.port(), 139);
        assert_eq!(ep.to_string(), "10.255.255.1:139");

        let v6: Endpoint = "[::1]:445".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:445");

        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":445".parse::<Endpoint>().is_err());
    }
}
