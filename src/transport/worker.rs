//! Reader worker loop.
//!
//! Runs while the transport is connected. Each read is bounded by the
//! socket timeout; an expiry is retried, since only the caller's response
//! bound decides whether a send fails. Fatal read errors fail every pending
//! exchange and close the transport.

use std::io;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::observability::metrics;
use crate::resilience::timeouts::{bounded, describe};
use crate::transport::conn::{FrameReader, Transport};

pub(crate) async fn run_reader(
    transport: Arc<Transport>,
    mut reader: FrameReader,
    token: CancellationToken,
) {
    let socket_timeout = transport.timeouts().socket;
    let close_when_idle = transport.settings().close_when_idle;

    tracing::debug!(
        transport_id = %transport.id(),
        socket_timeout = %describe(socket_timeout),
        "Reader worker started"
    );

    let failure = loop {
        let read = tokio::select! {
            _ = token.cancelled() => break None,
            read = bounded(socket_timeout, reader.next()) => read,
        };

        match read {
            Ok(Some(Ok(frame))) => {
                transport.touch();
                if !transport.exchanges.dispatch(frame.id, frame.payload.to_vec()) {
                    tracing::debug!(
                        transport_id = %transport.id(),
                        exchange_id = frame.id,
                        "Discarding reply for unknown or expired exchange"
                    );
                }
            }
            Ok(Some(Err(e))) => break Some(TransportError::io("socket read failed", e)),
            Ok(None) => {
                break Some(TransportError::io(
                    "server closed the connection",
                    io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream"),
                ))
            }
            Err(elapsed) => {
                metrics::record_socket_read_timeout();
                let err = TransportError::socket_read_timeout(
                    format!("no data within {}", describe(socket_timeout)),
                    elapsed,
                );
                if close_when_idle && transport.exchanges.is_empty() {
                    break Some(err);
                }
                tracing::trace!(
                    transport_id = %transport.id(),
                    pending = transport.exchanges.len(),
                    error = %err,
                    "Idle read timed out, retrying"
                );
            }
        }
    };

    match failure {
        // Cancelled without a close in progress: the owning manager went
        // away, so nobody else will tear this transport down.
        None if transport.is_live() => {
            tracing::debug!(transport_id = %transport.id(), "Reader worker cancelled by its manager");
            transport.close_detached(None);
        }
        None => {
            tracing::debug!(transport_id = %transport.id(), "Reader worker cancelled");
        }
        Some(err) if token.is_cancelled() => {
            tracing::debug!(transport_id = %transport.id(), error = %err, "Reader worker stopped during close");
        }
        Some(err) => {
            tracing::warn!(
                transport_id = %transport.id(),
                endpoint = %transport.endpoint(),
                error = %err,
                "Reader worker failed, closing transport"
            );
            transport.exchanges.fail_all(&err);
            transport.close_detached(Some(err.kind()));
        }
    }
}
