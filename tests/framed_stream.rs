//! Integration tests for typed payload streams over in-memory pipes

#![allow(clippy::expect_used, clippy::unwrap_used)]

use netwire::config::FramingConfig;
use netwire::core::serialization::{AnyCodec, BinaryCodec, JsonCodec, Payload};
use netwire::error::WireError;
use netwire::protocol::FrameworkMessage;
use netwire::transport::{PayloadStream, Received};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Chat {
    from: String,
    text: String,
}

impl Payload for Chat {
    const TYPE_TAG: &'static str = "chat";
}

fn chat(text: &str) -> Chat {
    Chat {
        from: "ann".to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_typed_send_and_recv() {
    let (a, b) = tokio::io::duplex(1024);
    let mut client = PayloadStream::new(a, JsonCodec::default());
    let mut server = PayloadStream::new(b, JsonCodec::default());

    client.send(&chat("hi")).await.unwrap();
    client.send(&FrameworkMessage::ping(1)).await.unwrap();

    assert_eq!(server.recv::<Chat>().await.unwrap(), Some(chat("hi")));
    let ping = server.recv::<FrameworkMessage>().await.unwrap().unwrap();
    server.send(&ping.into_reply()).await.unwrap();

    assert_eq!(
        client.recv::<FrameworkMessage>().await.unwrap(),
        Some(FrameworkMessage::Ping { id: 1, is_reply: true })
    );
}

#[tokio::test]
async fn test_recv_any_separates_framework_messages() {
    let (a, b) = tokio::io::duplex(1024);
    let mut tx = PayloadStream::new(a, BinaryCodec::default());
    let mut rx = PayloadStream::new(b, BinaryCodec::default());

    tx.send(&FrameworkMessage::RegisterTcp { connection_id: 12 }).await.unwrap();
    tx.send(&chat("after register")).await.unwrap();
    drop(tx);

    match rx.recv_any().await.unwrap() {
        Some(Received::Framework(FrameworkMessage::RegisterTcp { connection_id })) => {
            assert_eq!(connection_id, 12)
        }
        other => panic!("expected RegisterTcp, got {other:?}"),
    }

    let user = rx.recv_any().await.unwrap().expect("user payload");
    match &user {
        Received::User { tag, .. } => assert_eq!(tag, "chat"),
        other => panic!("expected user payload, got {other:?}"),
    }
    assert_eq!(user.decode::<Chat, _>(rx.codec()).unwrap(), chat("after register"));
    assert!(rx.recv_any().await.unwrap().is_none());
}

#[tokio::test]
async fn test_frames_split_across_tiny_writes() {
    let (mut raw, b) = tokio::io::duplex(4096);
    let mut rx = PayloadStream::new(b, JsonCodec::default());

    let mut wire = Vec::new();
    for text in ["one", "two", "three"] {
        let mut buf = bytes::BytesMut::new();
        netwire::core::codec::FrameCodec::new(JsonCodec::default())
            .encode_payload(&chat(text), &mut buf)
            .unwrap();
        wire.extend_from_slice(&buf);
    }

    let writer = tokio::spawn(async move {
        for chunk in wire.chunks(3) {
            raw.write_all(chunk).await.unwrap();
            raw.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    for text in ["one", "two", "three"] {
        assert_eq!(rx.recv::<Chat>().await.unwrap(), Some(chat(text)));
    }
    writer.await.unwrap();
    assert!(rx.recv::<Chat>().await.unwrap().is_none());
}

#[tokio::test]
async fn test_oversized_incoming_frame_is_rejected() {
    let (mut raw, b) = tokio::io::duplex(64);
    let mut rx = PayloadStream::from_config(b, JsonCodec::default(), &FramingConfig { max_frame_len: 32 });

    raw.write_all(&1000u32.to_be_bytes()).await.unwrap();
    assert!(matches!(rx.recv_body().await, Err(WireError::OversizedFrame(1000))));
}

#[tokio::test]
async fn test_wire_bytes_are_length_prefixed_json() {
    let (a, mut raw) = tokio::io::duplex(256);
    let mut tx = PayloadStream::new(a, AnyCodec::default());
    tx.send(&FrameworkMessage::DiscoverHost).await.unwrap();
    drop(tx);

    let mut wire = Vec::new();
    raw.read_to_end(&mut wire).await.unwrap();
    let body = br#"~fw:"DiscoverHost""#;
    assert_eq!(&wire[..4], &(body.len() as u32).to_be_bytes());
    assert_eq!(&wire[4..], body);
}

#[tokio::test]
async fn test_metrics_track_frames() {
    let (a, b) = tokio::io::duplex(1024);
    let mut tx = PayloadStream::new(a, JsonCodec::default());
    let mut rx = PayloadStream::new(b, JsonCodec::default()).with_metrics(tx.metrics().clone());

    tx.send(&chat("x")).await.unwrap();
    tx.send_keep_alive().await.unwrap();
    rx.recv_body().await.unwrap();
    rx.recv_body().await.unwrap();

    let snap = tx.metrics().snapshot();
    assert_eq!(snap.frames_sent, 2);
    assert_eq!(snap.frames_received, 2);
    assert_eq!(snap.payloads_encoded, 1);
}
