//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! transport manager / supervisor / reader workers
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//! ```
//!
//! # Design Decisions
//! - Events carry transport_id / endpoint / worker fields
//! - No metrics exporter is installed here; the embedding binary decides

pub mod logging;
pub mod metrics;
