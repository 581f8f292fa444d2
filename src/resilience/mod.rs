//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! connect:  timeouts.rs (connect bound, then negotiation bound)
//! send:     timeouts.rs (response bound)
//! worker:   timeouts.rs (socket read bound, retried while connected)
//! ```
//!
//! # Design Decisions
//! - Every blocking phase has a deadline unless configured as zero
//! - Timeout errors are distinct from other I/O errors

pub mod timeouts;
