//! A single managed connection.
//!
//! # Responsibilities
//! - Own the socket write half and the reader worker handle
//! - Hold the state machine and pending exchanges
//! - Tear everything down exactly once on close

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::config::{Timeouts, WorkerConfig};
use crate::error::{ErrorKind, TransportError};
use crate::lifecycle::{WorkerHandle, WorkerSupervisor, WORKER_NAME_PREFIX};
use crate::net::{Endpoint, ExchangeCodec, TransportId};
use crate::transport::exchange::ExchangeTable;
use crate::transport::state::{StateCell, TransportState};

/// Framed read half, owned by the reader worker once connected.
pub(crate) type FrameReader = FramedRead<OwnedReadHalf, ExchangeCodec>;

/// Framed write half, shared by senders under the writer lock.
pub(crate) type FrameWriter = FramedWrite<OwnedWriteHalf, ExchangeCodec>;

/// One logical connection to an endpoint plus its reader worker.
pub struct Transport {
    id: TransportId,
    endpoint: Endpoint,
    timeouts: Timeouts,
    settings: WorkerConfig,
    pub(crate) state: StateCell,
    pub(crate) exchanges: ExchangeTable,
    /// Write half; `None` before connect and after close.
    pub(crate) writer: tokio::sync::Mutex<Option<FrameWriter>>,
    /// Reader worker; at most one per transport.
    pub(crate) worker: Mutex<Option<WorkerHandle>>,
    /// Cancels an in-flight connect or write when close begins.
    pub(crate) cancel: CancellationToken,
    supervisor: WorkerSupervisor,
    created: Instant,
    /// Microseconds since `created` of the last read or write.
    last_activity_us: AtomicU64,
    negotiated: Mutex<Option<Vec<u8>>>,
    close_reason: Mutex<Option<ErrorKind>>,
}

impl Transport {
    pub(crate) fn new(
        endpoint: Endpoint,
        timeouts: Timeouts,
        settings: WorkerConfig,
        supervisor: WorkerSupervisor,
    ) -> Self {
        Self {
            id: TransportId::new(),
            endpoint,
            timeouts,
            settings,
            state: StateCell::new(),
            exchanges: ExchangeTable::new(),
            writer: tokio::sync::Mutex::new(None),
            worker: Mutex::new(None),
            cancel: CancellationToken::new(),
            supervisor,
            created: Instant::now(),
            last_activity_us: AtomicU64::new(0),
            negotiated: Mutex::new(None),
            close_reason: Mutex::new(None),
        }
    }

    pub fn id(&self) -> TransportId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> TransportState {
        self.state.get()
    }

    pub fn is_live(&self) -> bool {
        self.state.get().is_live()
    }

    /// Timeout bounds captured when the transport was acquired.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn settings(&self) -> &WorkerConfig {
        &self.settings
    }

    /// Name given to this transport's reader worker.
    pub fn worker_name(&self) -> String {
        format!("{}-{}-{}", WORKER_NAME_PREFIX, self.id.as_u64(), self.endpoint)
    }

    pub fn pending_exchanges(&self) -> usize {
        self.exchanges.len()
    }

    /// Time of the last successful read or write (creation time if none).
    pub fn last_activity(&self) -> Instant {
        self.created + Duration::from_micros(self.last_activity_us.load(Ordering::Relaxed))
    }

    pub(crate) fn touch(&self) {
        let us = self.created.elapsed().as_micros() as u64;
        self.last_activity_us.fetch_max(us, Ordering::Relaxed);
    }

    /// Reply to the connect-phase negotiation, if one was configured.
    pub fn negotiated(&self) -> Option<Vec<u8>> {
        self.negotiated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_negotiated(&self, reply: Vec<u8>) {
        *self.negotiated.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply);
    }

    /// Why the transport closed, when it closed because of a failure.
    pub fn close_reason(&self) -> Option<ErrorKind> {
        *self.close_reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    /// Tear the transport down. Idempotent.
    ///
    /// The first caller cancels any in-flight connect or write, terminates
    /// the reader worker, drops the socket and fails pending exchanges.
    /// Every other caller waits until that teardown has finished, so no
    /// caller returns while the worker may still run.
    pub(crate) async fn close(&self, reason: Option<ErrorKind>) {
        let previous = match self.state.begin_close() {
            Some(previous) => previous,
            None => {
                self.state.wait_for(|s| *s == TransportState::Closed).await;
                return;
            }
        };

        if let Some(kind) = reason {
            *self.close_reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(kind);
        }
        self.cancel.cancel();

        let handle = {
            let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(handle) = handle {
            self.supervisor.terminate(handle).await;
        }

        self.writer.lock().await.take();

        let failed = self
            .exchanges
            .fail_all(&TransportError::new(ErrorKind::GeneralIo, "transport closed"));

        self.state.finish_close();

        tracing::info!(
            transport_id = %self.id,
            endpoint = %self.endpoint,
            from = %previous,
            reason = reason.map(|k| k.as_str()).unwrap_or("requested"),
            failed_exchanges = failed,
            "Transport closed"
        );
    }

    /// Close from a context that must not wait for the teardown, such as
    /// the reader worker itself. The teardown is tracked by the supervisor.
    pub(crate) fn close_detached(self: &Arc<Self>, reason: Option<ErrorKind>) {
        let transport = Arc::clone(self);
        self.supervisor.spawn_teardown(async move {
            transport.close(reason).await;
        });
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .field("pending_exchanges", &self.exchanges.len())
            .finish()
    }
}
