//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges. All violations
//! are returned together, not just the first.

use thiserror::Error;

use crate::config::schema::TransportConfig;
use crate::net::codec::FRAME_HEADER_LEN;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transport.max_frame_size must exceed the {min}-byte frame header, got {actual}")]
    FrameTooSmall { min: usize, actual: usize },

    #[error("transport.negotiate_request of {len} bytes does not fit a {max}-byte frame")]
    NegotiateTooLarge { len: usize, max: usize },

    #[error("transport.worker_grace_ms must be greater than zero")]
    ZeroWorkerGrace,

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),
}

/// Validate a configuration, collecting every violation.
///
/// Zero timeouts are accepted and mean "unbounded".
pub fn validate_config(config: &TransportConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.transport.max_frame_size <= FRAME_HEADER_LEN {
        errors.push(ValidationError::FrameTooSmall {
            min: FRAME_HEADER_LEN,
            actual: config.transport.max_frame_size,
        });
    }

    let negotiate_len = config.transport.negotiate_request.len();
    if FRAME_HEADER_LEN + negotiate_len > config.transport.max_frame_size {
        errors.push(ValidationError::NegotiateTooLarge {
            len: negotiate_len,
            max: config.transport.max_frame_size,
        });
    }

    if config.transport.worker_grace_ms == 0 {
        errors.push(ValidationError::ZeroWorkerGrace);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TransportConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_timeouts_are_valid() {
        let mut config = TransportConfig::default();
        config.timeouts.connect_ms = 0;
        config.timeouts.response_ms = 0;
        config.timeouts.socket_ms = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = TransportConfig::default();
        config.transport.max_frame_size = 4;
        config.transport.worker_grace_ms = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroWorkerGrace));
        assert!(errors.contains(&ValidationError::NegotiateTooLarge { len: 9, max: 4 }));
    }
}
