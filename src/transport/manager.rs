//! Transport manager.
//!
//! # Responsibilities
//! - Pool one live transport per endpoint
//! - Connect within the connect bound, then negotiate within the response bound
//! - Send a request and wait within the response bound for its reply
//! - Translate every low-level failure into a typed [`TransportError`]
//!
//! # Design Decisions
//! - Timeouts cancel the blocked operation by dropping it and closing the
//!   transport; the caller gets exactly one outcome
//! - Every connect ends with a negotiation exchange; a listener that
//!   accepts but never answers is a connect timeout, not a live transport
//! - Derived managers share the worker registry but not the pool, so a
//!   connection opened with one set of bounds is never reused under another
//! - Each manager owns a cancellation scope; dropping the last handle
//!   cancels its connects and workers, and the workers close their transports

use std::io;
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::config::{
    DelegatingTimeouts, TimeoutOverrides, TimeoutProvider, Timeouts, TransportConfig, WorkerConfig,
};
use crate::error::{ErrorKind, TransportError, TransportResult};
use crate::lifecycle::WorkerSupervisor;
use crate::net::{Endpoint, ExchangeCodec, Frame};
use crate::observability::metrics;
use crate::resilience::timeouts::{bounded, describe};
use crate::transport::conn::{FrameReader, FrameWriter, Transport};
use crate::transport::exchange::NEGOTIATE_EXCHANGE_ID;
use crate::transport::state::{ConnectStart, TransportState};
use crate::transport::worker::run_reader;

/// Framed socket halves produced by a successful establish phase.
type Established = (FrameReader, FrameWriter);

/// Manages transports to remote endpoints.
///
/// Cloning is cheap and clones share the pool. When the last clone is
/// dropped, pending connects and reader workers of this manager are
/// cancelled; call [`shutdown`](Self::shutdown) to wait for the teardown.
#[derive(Debug, Clone)]
pub struct TransportManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    timeouts: Arc<dyn TimeoutProvider>,
    settings: WorkerConfig,
    /// Registry shared with every derived manager.
    registry: WorkerSupervisor,
    /// This manager's own cancellation scope over `registry`.
    supervisor: WorkerSupervisor,
    pool: DashMap<Endpoint, Arc<Transport>>,
    negotiate: Arc<[u8]>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let mut live = 0;
        for entry in self.pool.iter() {
            let transport = entry.value();
            if transport.is_live() {
                live += 1;
            }
            transport.cancel.cancel();
        }
        self.supervisor.cancel_all();
        if live > 0 {
            tracing::debug!(transports = live, "Transport manager dropped, cancelling its transports");
        }
    }
}

impl TransportManager {
    /// Create a manager from a loaded configuration.
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_provider(Arc::new(Timeouts::from(config.timeouts)), config.transport.clone())
    }

    /// Create a manager with an explicit timeout provider.
    pub fn with_provider(timeouts: Arc<dyn TimeoutProvider>, settings: WorkerConfig) -> Self {
        let registry = WorkerSupervisor::new(settings.worker_grace());
        let negotiate: Arc<[u8]> = Arc::from(settings.negotiate_request.as_bytes());
        Self {
            inner: Arc::new(ManagerInner {
                timeouts,
                settings,
                supervisor: registry.scoped(),
                registry,
                pool: DashMap::new(),
                negotiate,
            }),
        }
    }

    /// Use `payload` as the negotiation request sent during every connect,
    /// instead of the configured one.
    pub fn with_negotiation(self, payload: impl Into<Vec<u8>>) -> Self {
        let payload: Vec<u8> = payload.into();
        let payload: Arc<[u8]> = payload.into();
        self.derive(Arc::clone(&self.inner.timeouts), payload)
    }

    /// Derive a manager that uses `timeouts`. The current manager and its
    /// provider are left untouched.
    pub fn with_timeouts(&self, timeouts: Arc<dyn TimeoutProvider>) -> Self {
        self.derive(timeouts, Arc::clone(&self.inner.negotiate))
    }

    /// Derive a manager whose timeouts are this manager's with `overrides` applied.
    pub fn with_overrides(&self, overrides: TimeoutOverrides) -> Self {
        let provider = DelegatingTimeouts::new(Arc::clone(&self.inner.timeouts), overrides);
        self.with_timeouts(Arc::new(provider))
    }

    fn derive(&self, timeouts: Arc<dyn TimeoutProvider>, negotiate: Arc<[u8]>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                timeouts,
                settings: self.inner.settings.clone(),
                registry: self.inner.registry.clone(),
                supervisor: self.inner.registry.scoped(),
                pool: DashMap::new(),
                negotiate,
            }),
        }
    }

    /// Current timeout bounds.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_provider(self.inner.timeouts.as_ref())
    }

    /// This manager's worker supervisor. Its registry lists the workers of
    /// every manager derived from the same root.
    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.inner.supervisor
    }

    /// Number of pooled transports, live or not yet evicted.
    pub fn transport_count(&self) -> usize {
        self.inner.pool.len()
    }

    /// Return the live transport for `endpoint`, or create a new one in
    /// state `New`.
    pub fn acquire(&self, endpoint: &Endpoint) -> Arc<Transport> {
        match self.inner.pool.entry(endpoint.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live() {
                    return Arc::clone(entry.get());
                }
                let transport = self.new_transport(endpoint);
                entry.insert(Arc::clone(&transport));
                transport
            }
            Entry::Vacant(entry) => {
                let transport = self.new_transport(endpoint);
                entry.insert(Arc::clone(&transport));
                transport
            }
        }
    }

    fn new_transport(&self, endpoint: &Endpoint) -> Arc<Transport> {
        let transport = Arc::new(Transport::new(
            endpoint.clone(),
            self.timeouts(),
            self.inner.settings.clone(),
            self.inner.supervisor.clone(),
        ));
        tracing::debug!(transport_id = %transport.id(), endpoint = %endpoint, "Transport created");
        transport
    }

    /// Connect `transport`: `New → Connecting → Connected`.
    ///
    /// Fails with `ConnectionTimeout` when the connect or negotiation bound
    /// expires, and `GeneralIo` for any other failure. On failure the
    /// transport is closed.
    pub async fn connect(&self, transport: &Arc<Transport>) -> TransportResult<()> {
        let started = Instant::now();
        let result = self.connect_inner(transport).await;
        metrics::record_connect(&result, started);
        result
    }

    async fn connect_inner(&self, transport: &Arc<Transport>) -> TransportResult<()> {
        match transport.state.begin_connect() {
            ConnectStart::Started => {}
            ConnectStart::AlreadyConnected => return Ok(()),
            ConnectStart::InFlight => {
                let state = transport
                    .state
                    .wait_for(|s| *s != TransportState::Connecting)
                    .await;
                return if state.is_connected() {
                    Ok(())
                } else {
                    Err(TransportError::new(
                        ErrorKind::GeneralIo,
                        format!("connect to {} failed on another task", transport.endpoint()),
                    ))
                };
            }
            ConnectStart::Closed => {
                return Err(TransportError::new(
                    ErrorKind::GeneralIo,
                    format!("{} is closed", transport.id()),
                ))
            }
        }

        tracing::debug!(
            transport_id = %transport.id(),
            endpoint = %transport.endpoint(),
            "Connecting"
        );

        let established = tokio::select! {
            result = self.establish(transport) => result,
            _ = transport.cancel.cancelled() => Err(TransportError::new(
                ErrorKind::GeneralIo,
                "connect cancelled by close",
            )),
        };

        let (reader, writer) = match established {
            Ok(parts) => parts,
            Err(err) => {
                tracing::warn!(
                    transport_id = %transport.id(),
                    endpoint = %transport.endpoint(),
                    error = %err,
                    "Connect failed"
                );
                transport.close(Some(err.kind())).await;
                return Err(err);
            }
        };

        *transport.writer.lock().await = Some(writer);

        {
            let mut slot = transport
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if transport.state() == TransportState::Connecting {
                let worker_transport = Arc::clone(transport);
                let handle = transport.supervisor().spawn(transport.worker_name(), move |token| {
                    run_reader(worker_transport, reader, token)
                });
                *slot = Some(handle);
                transport
                    .state
                    .transition(TransportState::Connecting, TransportState::Connected);
            }
        }

        // Close may have claimed the transport at any point above; it then
        // owns the teardown of whatever was installed.
        if !transport.state().is_connected() {
            transport.close(None).await;
            transport.writer.lock().await.take();
            return Err(TransportError::new(
                ErrorKind::GeneralIo,
                "transport closed while connecting",
            ));
        }

        transport.touch();
        tracing::info!(
            transport_id = %transport.id(),
            endpoint = %transport.endpoint(),
            worker = %transport.worker_name(),
            "Transport connected"
        );
        Ok(())
    }

    /// TCP connect within the connect bound, then negotiation within the
    /// response bound. Both expiries are connect-phase timeouts.
    async fn establish(&self, transport: &Transport) -> TransportResult<Established> {
        let timeouts = transport.timeouts();
        let endpoint = transport.endpoint();

        let stream = match bounded(
            timeouts.connect,
            TcpStream::connect((endpoint.host(), endpoint.port())),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::io(format!("connect to {endpoint} failed"), e)),
            Err(elapsed) => {
                return Err(TransportError::connection_timeout(
                    format!("connect to {endpoint} exceeded {}", describe(timeouts.connect)),
                    elapsed,
                ))
            }
        };

        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::io("failed to configure socket", e))?;
        let codec = ExchangeCodec::new(transport.settings().max_frame_size);
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, codec.clone());
        let mut writer = FramedWrite::new(write_half, codec);

        let payload = Bytes::copy_from_slice(&self.inner.negotiate);
        let exchange = negotiate(&mut reader, &mut writer, payload);
        match bounded(timeouts.response, exchange).await {
            Ok(Ok(reply)) => transport.set_negotiated(reply.to_vec()),
            Ok(Err(e)) => {
                return Err(TransportError::io(format!("negotiation with {endpoint} failed"), e))
            }
            Err(elapsed) => {
                return Err(TransportError::connection_timeout(
                    format!(
                        "no negotiation reply from {endpoint} within {}",
                        describe(timeouts.response)
                    ),
                    elapsed,
                ))
            }
        }

        Ok((reader, writer))
    }

    /// Send `request` and wait for the correlated reply.
    ///
    /// Requires a connected transport. If no reply arrives within the
    /// response bound the wait is cancelled, the transport is closed and
    /// `ResponseTimeout` is returned. A reply racing the timeout is
    /// discarded.
    pub async fn send(&self, transport: &Arc<Transport>, request: &[u8]) -> TransportResult<Vec<u8>> {
        let result = self.send_inner(transport, request).await;
        metrics::record_exchange(&result);
        result
    }

    async fn send_inner(&self, transport: &Arc<Transport>, request: &[u8]) -> TransportResult<Vec<u8>> {
        let max_frame_size = transport.settings().max_frame_size;
        if !ExchangeCodec::new(max_frame_size).fits(request.len()) {
            return Err(TransportError::io(
                "request rejected",
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} byte request exceeds frame limit {max_frame_size}", request.len()),
                ),
            ));
        }

        let mut registered = None;
        transport.state.update(|state| {
            if !state.is_connected() {
                return false;
            }
            registered = Some(transport.exchanges.register());
            let changed = *state != TransportState::WaitingResponse;
            *state = TransportState::WaitingResponse;
            changed
        });
        let (id, reply) = registered.ok_or_else(|| {
            TransportError::new(
                ErrorKind::GeneralIo,
                format!("{} is not connected ({})", transport.id(), transport.state()),
            )
        })?;

        let response_timeout = transport.timeouts().response;
        let exchange = async {
            write_request(transport, id, request).await?;
            tracing::debug!(transport_id = %transport.id(), exchange_id = id, "Request sent");
            reply.await.unwrap_or_else(|_| {
                Err(TransportError::new(
                    ErrorKind::GeneralIo,
                    "transport closed before the reply arrived",
                ))
            })
        };

        let result = match bounded(response_timeout, exchange).await {
            Ok(result) => result,
            Err(elapsed) => {
                transport.exchanges.cancel(id);
                let err = TransportError::response_timeout(
                    format!(
                        "no reply to exchange {id} from {} within {}",
                        transport.endpoint(),
                        describe(response_timeout)
                    ),
                    elapsed,
                );
                tracing::warn!(transport_id = %transport.id(), exchange_id = id, error = %err, "Response timeout");
                transport.close(Some(ErrorKind::ResponseTimeout)).await;
                return Err(err);
            }
        };

        transport.exchanges.cancel(id);
        transport.state.update(|state| {
            if *state == TransportState::WaitingResponse && transport.exchanges.is_empty() {
                *state = TransportState::Connected;
                true
            } else {
                false
            }
        });

        if let Err(err) = &result {
            if transport.is_live() {
                tracing::warn!(transport_id = %transport.id(), error = %err, "Request failed, closing transport");
                transport.close(Some(err.kind())).await;
            }
        }
        result
    }

    /// Close `transport` and evict it from the pool. Idempotent.
    pub async fn close(&self, transport: &Arc<Transport>) {
        transport.close(None).await;
        self.inner
            .pool
            .remove_if(transport.endpoint(), |_, pooled| Arc::ptr_eq(pooled, transport));
    }

    /// Acquire, connect if needed, and send one request.
    pub async fn request(&self, endpoint: &Endpoint, payload: &[u8]) -> TransportResult<Vec<u8>> {
        let transport = self.acquire(endpoint);
        self.connect(&transport).await?;
        self.send(&transport, payload).await
    }

    /// Close every pooled transport and wait for detached teardowns.
    pub async fn shutdown(&self) {
        let transports: Vec<Arc<Transport>> =
            self.inner.pool.iter().map(|e| Arc::clone(e.value())).collect();
        for transport in &transports {
            self.close(transport).await;
        }

        let limit = self.inner.supervisor.grace() * 2;
        if !self.inner.supervisor.wait_teardowns(limit).await {
            tracing::warn!(
                pending = self.inner.supervisor.pending_teardowns(),
                "Teardown tasks still running after shutdown"
            );
        }
        tracing::info!(closed = transports.len(), "Transport manager shut down");
    }
}

async fn write_request(transport: &Transport, id: u64, request: &[u8]) -> TransportResult<()> {
    let mut guard = transport.writer.lock().await;
    let writer = guard.as_mut().ok_or_else(|| {
        TransportError::new(ErrorKind::GeneralIo, "transport closed before the request was written")
    })?;

    let frame = Frame::new(id, Bytes::copy_from_slice(request));
    tokio::select! {
        written = writer.send(frame) => {
            written.map_err(|e| TransportError::io("failed to write request", e))?;
        }
        _ = transport.cancel.cancelled() => {
            return Err(TransportError::new(ErrorKind::GeneralIo, "transport closed during write"));
        }
    }

    transport.touch();
    Ok(())
}

async fn negotiate(
    reader: &mut FrameReader,
    writer: &mut FrameWriter,
    payload: Bytes,
) -> io::Result<Bytes> {
    writer.send(Frame::new(NEGOTIATE_EXCHANGE_ID, payload)).await?;
    loop {
        match reader.next().await {
            Some(Ok(frame)) if frame.id == NEGOTIATE_EXCHANGE_ID => return Ok(frame.payload),
            Some(Ok(frame)) => {
                tracing::debug!(exchange_id = frame.id, "Ignoring frame received before negotiation reply");
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during negotiation",
                ))
            }
        }
    }
}
