//! Loopback integration tests for host discovery

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use netwire::config::{DiscoveryConfig, DiscoveryMode};
use netwire::core::codec::{CodecOptions, WireCodec};
use netwire::core::serialization::{AnyCodec, JsonCodec, Payload, WireFormat};
use netwire::discovery::{
    ClientDiscoveryHandler, DefaultClientDiscoveryHandler, DefaultDiscoveryHandler,
    DiscoveredHost, DiscoveryRequester, DiscoveryResponder, ExpectPayload, Fastest, PayloadReply,
    RejectAll, ReplyWith, ResponderHandle,
};
use netwire::error::WireError;
use netwire::protocol::FrameworkMessage;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

const WINDOW: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestDiscoveryResponse {
    id: i32,
    game_name: String,
    player_name: String,
}

impl Payload for TestDiscoveryResponse {
    const TYPE_TAG: &'static str = "test.DiscoveryResponse";
}

fn sample_response() -> TestDiscoveryResponse {
    TestDiscoveryResponse {
        id: 42,
        game_name: "gameName".to_string(),
        player_name: "playerName".to_string(),
    }
}

fn loopback_config() -> DiscoveryConfig {
    let mut config = DiscoveryConfig::with_targets([IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    config.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config
}

async fn spawn_responder<C, H>(ip: Ipv4Addr, port: u16, codec: C, handler: H) -> ResponderHandle
where
    C: WireCodec + 'static,
    H: netwire::discovery::ServerDiscoveryHandler + 'static,
{
    DiscoveryResponder::bind(SocketAddr::new(IpAddr::V4(ip), port), codec, handler)
        .await
        .expect("bind responder")
        .spawn()
        .expect("spawn responder")
}

/// Counts `on_finally` calls; accepts everything.
#[derive(Debug, Clone, Default)]
struct FinallyCounter {
    calls: Arc<AtomicUsize>,
}

impl ClientDiscoveryHandler for FinallyCounter {
    fn on_finally(&mut self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_discovers_loopback_server() {
    let server = spawn_responder(
        Ipv4Addr::LOCALHOST,
        0,
        JsonCodec::default(),
        DefaultDiscoveryHandler,
    )
    .await;

    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let host = requester
        .discover_host(server.port(), WINDOW, &mut DefaultClientDiscoveryHandler)
        .await
        .unwrap()
        .expect("server should answer");

    assert_eq!(host.endpoint.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(host.endpoint.port, server.port());
    assert!(host.is_bare());
    assert!(host.elapsed < WINDOW);

    let snap = server.metrics().snapshot();
    assert_eq!(snap.replies_sent, 1);
    assert_eq!(requester.metrics().snapshot().replies_accepted, 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_timeout_returns_none_after_window() {
    // Holds the port so nothing answers and no ICMP error comes back.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();

    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let timeout = Duration::from_millis(300);
    let started = Instant::now();
    let host = requester
        .discover_host(port, timeout, &mut DefaultClientDiscoveryHandler)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(host.is_none());
    assert!(elapsed >= Duration::from_millis(290), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "hung: {elapsed:?}");
}

#[tokio::test]
async fn test_rejecting_server_is_not_found() {
    let server = spawn_responder(Ipv4Addr::LOCALHOST, 0, JsonCodec::default(), RejectAll).await;

    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let host = requester
        .discover_host(
            server.port(),
            Duration::from_millis(200),
            &mut DefaultClientDiscoveryHandler,
        )
        .await
        .unwrap();

    assert!(host.is_none());
    assert_eq!(server.metrics().snapshot().discovery_requests_rejected, 1);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_responder_survives_malformed_request() {
    let server = spawn_responder(
        Ipv4Addr::LOCALHOST,
        0,
        JsonCodec::default(),
        DefaultDiscoveryHandler,
    )
    .await;

    let noisy = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    noisy
        .send_to(b"\xff\xfe definitely not a payload", server.local_addr())
        .await
        .unwrap();
    noisy.send_to(b"~fw:{", server.local_addr()).await.unwrap();
    let keep_alive = JsonCodec::default()
        .encode(&FrameworkMessage::KeepAlive)
        .unwrap();
    noisy.send_to(&keep_alive, server.local_addr()).await.unwrap();

    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let host = requester
        .discover_host(server.port(), WINDOW, &mut DefaultClientDiscoveryHandler)
        .await
        .unwrap();
    assert!(host.is_some());

    let snap = server.metrics().snapshot();
    assert_eq!(snap.malformed_datagrams, 2);
    assert_eq!(snap.replies_sent, 1);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_custom_payload_roundtrip_both_formats() {
    for format in [WireFormat::Json, WireFormat::Binary] {
        let codec = AnyCodec::new(format, CodecOptions::default());
        let server = spawn_responder(
            Ipv4Addr::LOCALHOST,
            0,
            codec,
            PayloadReply::new(sample_response()),
        )
        .await;

        let requester = DiscoveryRequester::new(codec, loopback_config());
        let mut handler = ExpectPayload::<TestDiscoveryResponse>::new();
        let host = requester
            .discover_host(server.port(), WINDOW, &mut handler)
            .await
            .unwrap()
            .expect("server should answer");

        assert!(handler.is_finished());
        let received = handler.into_received();
        assert_eq!(received.len(), 1, "{format:?}");
        assert_eq!(received[0].1, sample_response());
        assert_eq!(received[0].0.port, server.port());
        assert_eq!(host.decode::<TestDiscoveryResponse, _>(&codec).unwrap(), sample_response());

        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_reply_with_closure() {
    let server = spawn_responder(
        Ipv4Addr::LOCALHOST,
        0,
        JsonCodec::default(),
        ReplyWith::new(|from: SocketAddr| {
            Some(TestDiscoveryResponse {
                id: i32::from(from.port() % 100),
                game_name: "lobby".to_string(),
                player_name: from.ip().to_string(),
            })
        }),
    )
    .await;

    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let mut handler = ExpectPayload::<TestDiscoveryResponse>::new();
    requester
        .discover_host(server.port(), WINDOW, &mut handler)
        .await
        .unwrap()
        .expect("server should answer");

    assert_eq!(handler.received()[0].1.player_name, "127.0.0.1");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_rejects_unexpected_payload() {
    let server = spawn_responder(
        Ipv4Addr::LOCALHOST,
        0,
        JsonCodec::default(),
        DefaultDiscoveryHandler,
    )
    .await;

    // The empty default reply does not decode as a typed payload.
    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let mut handler = ExpectPayload::<TestDiscoveryResponse>::new();
    let host = requester
        .discover_host(server.port(), Duration::from_millis(300), &mut handler)
        .await
        .unwrap();

    assert!(host.is_none());
    assert_eq!(requester.metrics().snapshot().malformed_datagrams, 1);
    server.stop().await.unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_collects_concurrent_repliers() {
    let second_ip = Ipv4Addr::new(127, 0, 0, 2);
    let first = spawn_responder(
        Ipv4Addr::LOCALHOST,
        0,
        JsonCodec::default(),
        DefaultDiscoveryHandler,
    )
    .await;
    let port = first.port();
    let second = spawn_responder(second_ip, port, JsonCodec::default(), DefaultDiscoveryHandler).await;

    let mut config =
        DiscoveryConfig::with_targets([IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V4(second_ip)]);
    config.mode = DiscoveryMode::CollectAll;
    let requester = DiscoveryRequester::new(JsonCodec::default(), config);

    let window = Duration::from_millis(500);
    let hosts: Vec<DiscoveredHost> = requester
        .discover_hosts(port, window, &mut DefaultClientDiscoveryHandler)
        .await
        .unwrap();
    let mut addresses: Vec<IpAddr> = hosts.iter().map(|h| h.endpoint.address).collect();
    addresses.sort();
    assert_eq!(
        addresses,
        vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V4(second_ip)]
    );
    assert!(hosts.iter().all(|h| h.endpoint.port == port));

    let fastest = requester
        .discover_host(port, window, &mut Fastest::new(DefaultClientDiscoveryHandler))
        .await
        .unwrap()
        .expect("one host is selected");
    assert!(hosts.iter().any(|h| h.endpoint == fastest.endpoint));

    first.stop().await.unwrap();
    second.stop().await.unwrap();
}

#[tokio::test]
async fn test_finally_runs_once_on_every_outcome() {
    let server = spawn_responder(
        Ipv4Addr::LOCALHOST,
        0,
        JsonCodec::default(),
        DefaultDiscoveryHandler,
    )
    .await;
    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());

    // Success
    let mut handler = FinallyCounter::default();
    let found = requester
        .discover_host(server.port(), WINDOW, &mut handler)
        .await
        .unwrap();
    assert!(found.is_some());
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    // Not found
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut handler = FinallyCounter::default();
    let found = requester
        .discover_hosts(
            silent.local_addr().unwrap().port(),
            Duration::from_millis(100),
            &mut handler,
        )
        .await
        .unwrap();
    assert!(found.is_empty());
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    // Error: the bind address does not belong to this host
    let mut config = loopback_config();
    config.bind_address = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    let failing = DiscoveryRequester::new(JsonCodec::default(), config);
    let mut handler = FinallyCounter::default();
    let err = failing
        .discover_host(server.port(), WINDOW, &mut handler)
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Socket { .. }));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_finally_runs_when_task_is_cancelled() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();

    let handler = FinallyCounter::default();
    let calls = Arc::clone(&handler.calls);
    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let task = requester.spawn_discover_host(port, Duration::from_secs(30), handler);

    tokio::time::sleep(Duration::from_millis(50)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_spawned_discovery_returns_handler() {
    let server = spawn_responder(
        Ipv4Addr::LOCALHOST,
        0,
        JsonCodec::default(),
        PayloadReply::new(sample_response()),
    )
    .await;

    let requester = DiscoveryRequester::new(JsonCodec::default(), loopback_config());
    let (result, handler) = requester
        .spawn_discover_host(
            server.port(),
            WINDOW,
            ExpectPayload::<TestDiscoveryResponse>::new(),
        )
        .await
        .unwrap();

    assert!(result.unwrap().is_some());
    assert!(handler.is_finished());
    assert_eq!(handler.received()[0].1.id, 42);
    server.stop().await.unwrap();
}
