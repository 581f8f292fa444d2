//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Transport becomes CONNECTED:
//!     supervisor.rs spawn → named reader worker registered as live
//!
//! Transport closes:
//!     cancel worker token → wait up to grace → abort if still running
//!     → worker deregistered before close returns
//! ```
//!
//! # Design Decisions
//! - Worker names share a fixed prefix so leaks are observable
//! - Termination is awaited, never fire-and-forget
//! - A worker that ignores cancellation is aborted, then awaited
//! - Each manager cancels only its own scope of the shared registry

pub mod supervisor;

pub use supervisor::{WorkerHandle, WorkerSupervisor, WORKER_NAME_PREFIX};
