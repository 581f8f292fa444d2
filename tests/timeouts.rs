//! Timeout enforcement tests against loopback servers.

use std::time::{Duration, Instant};

use tokio::time::error::Elapsed;

use smb_transport::config::TimeoutConfig;
use smb_transport::{
    Endpoint, ErrorKind, TimeoutOverrides, TransportConfig, TransportError, TransportManager,
    TransportState,
};

mod common;
use common::Reply;

/// Failure latency must stay under 1.5x the relevant bounds.
fn assert_within_bound(started: Instant, manager: &TransportManager) {
    let timeouts = manager.timeouts();
    let limit = (timeouts.connect + timeouts.response).mul_f64(1.5);
    let elapsed = started.elapsed();
    assert!(
        elapsed < limit,
        "Timeout {elapsed:?} outside expected range ({limit:?})"
    );
}

async fn run_connect_timeout(manager: &TransportManager, endpoint: &Endpoint) -> TransportError {
    let before = common::live_workers(manager);
    let started = Instant::now();

    let transport = manager.acquire(endpoint);
    let err = manager
        .connect(&transport)
        .await
        .expect_err("Did not see error");

    assert_eq!(err.kind(), ErrorKind::ConnectionTimeout, "unexpected error: {err}");
    assert_within_bound(started, manager);
    assert_eq!(transport.state(), TransportState::Closed);

    let mut leaked = common::live_workers(manager);
    leaked.retain(|name| !before.contains(name));
    assert!(leaked.is_empty(), "Leaked transport workers, have {leaked:?}");
    err
}

#[tokio::test]
async fn test_connect_timeout_silent_listener() {
    let (_listener, endpoint) = common::start_silent_server().await;
    let manager = common::manager(100, 100, 35_000);

    let err = run_connect_timeout(&manager, &endpoint).await;
    assert!(err.cause_is::<Elapsed>());
}

#[tokio::test]
async fn test_connect_timeout_with_configured_negotiation() {
    let (_listener, endpoint) = common::start_silent_server().await;
    let manager = TransportManager::new(&TransportConfig::default()).with_overrides(
        TimeoutOverrides::new()
            .connect(Duration::from_millis(100))
            .response(Duration::from_millis(100)),
    );

    let err = run_connect_timeout(&manager, &endpoint).await;
    assert!(err.cause_is::<Elapsed>());
    assert!(err.message().contains("negotiation"), "unexpected error: {err}");
}

#[tokio::test]
async fn test_configured_negotiation_connects() {
    let endpoint = common::start_echo_server().await;
    let manager = TransportManager::new(&TransportConfig::default());

    let transport = manager.acquire(&endpoint);
    manager.connect(&transport).await.unwrap();
    assert_eq!(transport.negotiated().as_deref(), Some(common::NEGOTIATE_REPLY));

    manager.shutdown().await;
    assert!(common::live_workers(&manager).is_empty());
}

#[tokio::test]
async fn test_connect_timeout_saturated_backlog() {
    let (_listener, _fillers, endpoint) = common::start_saturated_server().await;
    let manager = common::manager(100, 100, 35_000);

    let err = run_connect_timeout(&manager, &endpoint).await;
    assert!(err.cause_is::<Elapsed>());
    assert!(err.message().starts_with("connect to"), "timed out after TCP connect: {err}");
}

#[tokio::test]
#[ignore = "needs a route that blackholes 10.255.255.1"]
async fn test_connect_timeout_unroutable() {
    let manager = common::manager(100, 100, 35_000);
    let endpoint = Endpoint::new("10.255.255.1", 139);

    let err = run_connect_timeout(&manager, &endpoint).await;
    assert!(err.cause_is::<Elapsed>());
}

#[tokio::test]
async fn test_connection_refused_is_general_io() {
    let manager = common::manager(1_000, 1_000, 35_000);
    let endpoint = common::closed_port().await;

    let transport = manager.acquire(&endpoint);
    let err = manager.connect(&transport).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::GeneralIo);
    assert!(err.cause_is::<std::io::Error>());
    assert_eq!(transport.state(), TransportState::Closed);
}

#[tokio::test]
async fn test_response_timeout_closes_transport() {
    let endpoint = common::start_programmable_server(|_| async { Reply::Ignore }).await;
    let manager = common::manager(1_000, 100, 35_000);

    let transport = manager.acquire(&endpoint);
    manager.connect(&transport).await.unwrap();
    assert_eq!(transport.negotiated().as_deref(), Some(common::NEGOTIATE_REPLY));
    assert_eq!(common::live_workers(&manager).len(), 1);

    let started = Instant::now();
    let err = manager.send(&transport, b"never answered").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ResponseTimeout);
    assert!(err.cause_is::<Elapsed>());
    assert_within_bound(started, &manager);
    assert_eq!(transport.state(), TransportState::Closed);
    assert_eq!(transport.close_reason(), Some(ErrorKind::ResponseTimeout));
    assert_eq!(transport.pending_exchanges(), 0);
    assert!(common::live_workers(&manager).is_empty());
}

#[tokio::test]
async fn test_repeated_reads_survive_socket_timeouts() {
    let endpoint = common::start_file_server().await;
    let manager = common::manager(1_000, 1_000, 100);

    let transport = manager.acquire(&endpoint);
    manager.connect(&transport).await.unwrap();

    let ack = manager.send(&transport, &[b'W', 1, 2, 3, 4]).await.unwrap();
    assert_eq!(ack, b"OK");

    for expected in 1u8..=4 {
        let same = manager.acquire(&endpoint);
        assert_eq!(same.id(), transport.id());

        let byte = manager.send(&same, b"R").await.unwrap();
        assert_eq!(byte, vec![expected]);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(transport.state().is_connected());
    assert_eq!(common::live_workers(&manager), vec![transport.worker_name()]);

    manager.close(&transport).await;
    assert!(common::live_workers(&manager).is_empty());
}

#[tokio::test]
async fn test_slow_reply_within_response_bound() {
    let endpoint = common::start_programmable_server(|frame| async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        Reply::Send(frame.payload.to_vec())
    })
    .await;
    let manager = common::manager(1_000, 2_000, 50);

    let reply = manager.request(&endpoint, b"slow").await.unwrap();
    assert_eq!(reply, b"slow");

    let transport = manager.acquire(&endpoint);
    assert_eq!(transport.state(), TransportState::Connected);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_close_when_idle() {
    let endpoint = common::start_echo_server().await;
    let manager = common::manager_with(
        TimeoutConfig {
            connect_ms: 1_000,
            response_ms: 1_000,
            socket_ms: 50,
        },
        true,
    );

    let transport = manager.acquire(&endpoint);
    manager.connect(&transport).await.unwrap();

    let state = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if transport.state() == TransportState::Closed {
                break transport.state();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("idle transport was not closed");

    assert_eq!(state, TransportState::Closed);
    assert_eq!(transport.close_reason(), Some(ErrorKind::SocketReadTimeout));
    assert!(common::live_workers(&manager).is_empty());

    // A fresh transport replaces the closed one.
    let next = manager.acquire(&endpoint);
    assert_ne!(next.id(), transport.id());
}

#[tokio::test]
async fn test_zero_timeouts_are_unbounded() {
    let endpoint = common::start_programmable_server(|frame| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Reply::Send(frame.payload.to_vec())
    })
    .await;
    let manager = common::manager_with(
        TimeoutConfig {
            connect_ms: 0,
            response_ms: 0,
            socket_ms: 0,
        },
        false,
    );

    assert_eq!(manager.request(&endpoint, b"x").await.unwrap(), b"x");
    manager.shutdown().await;
}
