//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TransportConfig (validated, immutable)
//!     → provider.rs (TimeoutProvider views, per-call overrides)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Overrides wrap a base provider; nothing global is ever mutated

pub mod loader;
pub mod provider;
pub mod schema;
pub mod validation;

pub use provider::{DelegatingTimeouts, TimeoutOverrides, TimeoutProvider, Timeouts};
pub use schema::{ObservabilityConfig, TimeoutConfig, TransportConfig, WorkerConfig};
