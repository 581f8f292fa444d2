//! Shared mock servers for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::codec::Framed;

use smb_transport::config::{TimeoutConfig, TransportConfig};
use smb_transport::net::{Endpoint, ExchangeCodec, Frame};
use smb_transport::transport::exchange::NEGOTIATE_EXCHANGE_ID;
use smb_transport::{TimeoutOverrides, TransportManager, WORKER_NAME_PREFIX};

pub const NEGOTIATE_REQUEST: &[u8] = b"NEGOTIATE";
#[allow(dead_code)]
pub const NEGOTIATE_REPLY: &[u8] = b"NEGOTIATED";

/// What a programmable server does with one received frame.
#[allow(dead_code)]
pub enum Reply {
    Send(Vec<u8>),
    Ignore,
    Hangup,
}

/// Build a manager the way a per-call context would: defaults plus overrides.
pub fn manager(connect_ms: u64, response_ms: u64, socket_ms: u64) -> TransportManager {
    let mut config = TransportConfig::default();
    config.transport.worker_grace_ms = 500;
    TransportManager::new(&config)
        .with_negotiation(NEGOTIATE_REQUEST)
        .with_overrides(
            TimeoutOverrides::new()
                .connect(Duration::from_millis(connect_ms))
                .response(Duration::from_millis(response_ms))
                .socket(Duration::from_millis(socket_ms)),
        )
}

/// Manager built directly from a timeout config, with extra worker settings.
#[allow(dead_code)]
pub fn manager_with(timeouts: TimeoutConfig, close_when_idle: bool) -> TransportManager {
    let mut config = TransportConfig::default();
    config.timeouts = timeouts;
    config.transport.worker_grace_ms = 500;
    config.transport.close_when_idle = close_when_idle;
    TransportManager::new(&config).with_negotiation(NEGOTIATE_REQUEST)
}

/// Live reader workers of `manager`.
#[allow(dead_code)]
pub fn live_workers(manager: &TransportManager) -> Vec<String> {
    manager.supervisor().live_workers_with_prefix(WORKER_NAME_PREFIX)
}

/// Bind a listener that never accepts or answers. Keep the returned
/// listener alive for the duration of the test.
#[allow(dead_code)]
pub async fn start_silent_server() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::from(listener.local_addr().unwrap());
    (listener, endpoint)
}

/// Bind a listener with a zero backlog and fill its accept queue, so
/// further SYNs are dropped and a TCP connect to it hangs. Keep the
/// listener and the filler streams alive for the duration of the test.
#[allow(dead_code)]
pub async fn start_saturated_server() -> (TcpListener, Vec<TcpStream>, Endpoint) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut fillers = Vec::new();
    for _ in 0..16 {
        match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => fillers.push(stream),
            _ => break,
        }
    }
    (listener, fillers, Endpoint::from(addr))
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn closed_port() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Endpoint::from(addr)
}

/// Start a frame server. Negotiation frames are always answered; other
/// frames go to `handler`, one at a time per connection.
pub async fn start_programmable_server<F, Fut>(handler: F) -> Endpoint
where
    F: Fn(Frame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let mut framed = Framed::new(socket, ExchangeCodec::new(1 << 20));
                while let Some(Ok(frame)) = framed.next().await {
                    let id = frame.id;
                    let reply = if id == NEGOTIATE_EXCHANGE_ID {
                        Reply::Send(NEGOTIATE_REPLY.to_vec())
                    } else {
                        handler(frame).await
                    };
                    match reply {
                        Reply::Send(payload) => {
                            if framed.send(Frame::new(id, payload)).await.is_err() {
                                break;
                            }
                        }
                        Reply::Ignore => {}
                        Reply::Hangup => break,
                    }
                }
            });
        }
    });

    Endpoint::from(addr)
}

/// Server that echoes every payload back.
#[allow(dead_code)]
pub async fn start_echo_server() -> Endpoint {
    start_programmable_server(|frame| async move { Reply::Send(frame.payload.to_vec()) }).await
}

/// Server holding one remote file per connection-independent store.
///
/// `W<bytes>` appends and replies `OK`; `R` replies with the next byte (or
/// nothing at end of file).
#[allow(dead_code)]
pub async fn start_file_server() -> Endpoint {
    let file: Arc<Mutex<(Vec<u8>, usize)>> = Arc::new(Mutex::new((Vec::new(), 0)));
    start_programmable_server(move |frame| {
        let file = Arc::clone(&file);
        async move {
            let mut guard = file.lock().unwrap();
            let (data, pos) = &mut *guard;
            match frame.payload.split_first() {
                Some((b'W', bytes)) => {
                    data.extend_from_slice(bytes);
                    Reply::Send(b"OK".to_vec())
                }
                Some((b'R', _)) => {
                    let out: Vec<u8> = data.get(*pos).map(|b| vec![*b]).unwrap_or_default();
                    *pos += out.len();
                    Reply::Send(out)
                }
                _ => Reply::Send(b"ERR".to_vec()),
            }
        }
    })
    .await
}
