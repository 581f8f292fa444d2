//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap connect, negotiation, response and socket reads with a bound
//! - Treat a zero bound as "wait without limit"
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the wrapped future cancels it
//! - The `Elapsed` value is kept as the cause of the typed error

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Run `fut` for at most `limit`. A zero `limit` disables the bound.
pub async fn bounded<F>(limit: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    if limit.is_zero() {
        Ok(fut.await)
    } else {
        tokio::time::timeout(limit, fut).await
    }
}

/// Render a bound for error messages.
pub fn describe(limit: Duration) -> String {
    if limit.is_zero() {
        "unbounded".to_string()
    } else {
        format!("{}ms", limit.as_millis())
    }
}
