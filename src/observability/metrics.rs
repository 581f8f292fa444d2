//! Metrics collection.
//!
//! # Metrics
//! - `transport_connect_total` (counter): connect outcomes by `outcome`
//! - `transport_connect_duration_seconds` (histogram): time spent connecting
//! - `transport_exchange_total` (counter): send outcomes by `outcome`
//! - `transport_socket_read_timeouts_total` (counter): idle read expiries
//! - `transport_workers_active` (gauge): running reader workers
//! - `transport_worker_aborts_total` (counter): workers stopped by abort

use std::time::Instant;

use crate::error::TransportError;

fn outcome<T>(result: &Result<T, TransportError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind().as_str(),
    }
}

pub fn record_connect<T>(result: &Result<T, TransportError>, started: Instant) {
    metrics::counter!("transport_connect_total", "outcome" => outcome(result)).increment(1);
    metrics::histogram!("transport_connect_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_exchange<T>(result: &Result<T, TransportError>) {
    metrics::counter!("transport_exchange_total", "outcome" => outcome(result)).increment(1);
}

pub fn record_socket_read_timeout() {
    metrics::counter!("transport_socket_read_timeouts_total").increment(1);
}

pub fn record_workers_active(count: usize) {
    metrics::gauge!("transport_workers_active").set(count as f64);
}

pub fn record_worker_abort() {
    metrics::counter!("transport_worker_aborts_total").increment(1);
}
