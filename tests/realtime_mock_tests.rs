//! Integration tests driving the realtime client against a scripted mock peer.
//!
//! Each test binds a loopback listener, accepts one WebSocket connection, and
//! plays a fixed sequence of protocol events against the client under test.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use talkwire::{AudioSource, BaseRealtime, ClientConfig, RealtimeClient, RealtimeError};

type Peer = WebSocketStream<TcpStream>;

/// Accept one WebSocket connection on a loopback port and run the given
/// script against it. Returns the endpoint URL for the client.
async fn spawn_mock_peer<F, Fut>(script: F) -> String
where
    F: FnOnce(Peer) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}")
}

fn test_config(endpoint: String, output: PathBuf) -> ClientConfig {
    ClientConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(endpoint),
        output_path: output,
        handshake_timeout_ms: 2_000,
        ..Default::default()
    }
}

/// Read the next inbound text frame and parse it as JSON.
async fn next_json(peer: &mut Peer) -> serde_json::Value {
    loop {
        match peer.next().await.expect("peer stream ended").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(data) => peer.send(Message::Pong(data)).await.unwrap(),
            other => panic!("unexpected frame from client: {other:?}"),
        }
    }
}

async fn send_json(peer: &mut Peer, value: serde_json::Value) {
    peer.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Consume the configuration event and acknowledge it.
async fn ack_handshake(peer: &mut Peer) {
    let update = next_json(peer).await;
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["output_audio_format"], "pcm16");
    send_json(
        peer,
        serde_json::json!({"type": "session.updated", "session": {"id": "sess_1"}}),
    )
    .await;
}

/// Consume one upload cycle (item create followed by response create) and
/// return the uploaded item.
async fn read_upload(peer: &mut Peer) -> serde_json::Value {
    let item = next_json(peer).await;
    assert_eq!(item["type"], "conversation.item.create");
    let create = next_json(peer).await;
    assert_eq!(create["type"], "response.create");
    item
}

fn text_delta(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "response.text.delta",
        "response_id": "resp_1",
        "item_id": "item_1",
        "output_index": 0,
        "content_index": 0,
        "delta": text,
    })
}

fn done() -> serde_json::Value {
    serde_json::json!({"type": "response.done", "response": {"id": "resp_1"}})
}

#[tokio::test]
async fn test_upload_carries_base64_pcm() {
    let pcm = vec![1u8, 2, 3, 4, 5, 6];
    let expected = BASE64_STANDARD.encode(&pcm);

    let url = spawn_mock_peer(move |mut peer| async move {
        ack_handshake(&mut peer).await;
        let item = read_upload(&mut peer).await;
        assert_eq!(item["item"]["role"], "user");
        assert_eq!(item["item"]["content"][0]["type"], "input_audio");
        assert_eq!(item["item"]["content"][0]["audio"], expected);
        send_json(&mut peer, done()).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();
    client.connect().await.unwrap();

    let handle = client
        .submit_audio(AudioSource::RawPcm(pcm.into()))
        .await
        .unwrap();
    let output = handle.wait().await.unwrap();
    assert_eq!(output.text, "");
}

#[tokio::test]
async fn test_text_fragments_aggregate_in_order() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        send_json(&mut peer, text_delta("Hello")).await;
        send_json(&mut peer, text_delta("there")).await;
        send_json(&mut peer, text_delta("friend")).await;
        send_json(&mut peer, done()).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();
    client.connect().await.unwrap();
    assert!(client.is_connected());

    let handle = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap();
    let output = handle.wait().await.unwrap();

    assert_eq!(output.text, "Hello there friend");
    assert_eq!(output.transcript, "");
    assert!(output.audio_path.is_none());
}

#[tokio::test]
async fn test_audio_and_transcript_fragments_materialize() {
    // Two PCM chunks that must land in the artifact concatenated, in order.
    let chunk_a: Vec<u8> = vec![0x10, 0x00, 0x20, 0x00];
    let chunk_b: Vec<u8> = vec![0x30, 0x00];
    let a64 = BASE64_STANDARD.encode(&chunk_a);
    let b64 = BASE64_STANDARD.encode(&chunk_b);

    let url = spawn_mock_peer(move |mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        send_json(
            &mut peer,
            serde_json::json!({"type": "response.audio.delta", "delta": a64}),
        )
        .await;
        send_json(
            &mut peer,
            serde_json::json!({"type": "response.audio_transcript.delta", "delta": "Hel"}),
        )
        .await;
        send_json(
            &mut peer,
            serde_json::json!({"type": "response.audio.delta", "delta": b64}),
        )
        .await;
        send_json(
            &mut peer,
            serde_json::json!({"type": "response.audio_transcript.delta", "delta": "lo"}),
        )
        .await;
        send_json(&mut peer, done()).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let reply = dir.path().join("reply.wav");
    let client = RealtimeClient::new(test_config(url, reply.clone())).unwrap();
    client.connect().await.unwrap();

    let handle = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap();
    let output = handle.wait().await.unwrap();

    assert_eq!(output.transcript, "Hello");
    assert_eq!(output.audio_path.as_deref(), Some(reply.as_path()));

    let reader = hound::WavReader::open(&reply).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 24_000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.channels, 1);
    let samples: Vec<i16> = reader.into_samples().map(Result::unwrap).collect();
    assert_eq!(samples, vec![0x10, 0x20, 0x30]);
}

#[tokio::test]
async fn test_peer_error_rejects_turn_and_session_stays_usable() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        send_json(
            &mut peer,
            serde_json::json!({
                "type": "error",
                "error": {"type": "rate_limit_error", "message": "rate limited"},
            }),
        )
        .await;
        // The session must remain usable for a fresh turn.
        read_upload(&mut peer).await;
        send_json(&mut peer, text_delta("recovered")).await;
        send_json(&mut peer, done()).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let reply = dir.path().join("reply.wav");
    let client = RealtimeClient::new(test_config(url, reply.clone())).unwrap();
    client.connect().await.unwrap();

    let handle = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap();
    match handle.wait().await {
        Err(RealtimeError::Protocol(message)) => assert_eq!(message, "rate limited"),
        other => panic!("expected protocol error, got {other:?}"),
    }
    // Nothing was materialized for the failed turn.
    assert!(!reply.exists());

    let handle = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap();
    let output = handle.wait().await.unwrap();
    assert_eq!(output.text, "recovered");
}

#[tokio::test]
async fn test_buffers_do_not_leak_across_turns() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        send_json(&mut peer, text_delta("Hello")).await;
        send_json(&mut peer, done()).await;
        read_upload(&mut peer).await;
        send_json(&mut peer, text_delta("friend")).await;
        send_json(&mut peer, done()).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();
    client.connect().await.unwrap();

    let first = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(first.text, "Hello");

    let second = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(second.text, "friend");
}

#[tokio::test]
async fn test_handshake_timeout_rejects_instead_of_hanging() {
    let url = spawn_mock_peer(|mut peer| async move {
        // Swallow the configuration event and never acknowledge it.
        let update = next_json(&mut peer).await;
        assert_eq!(update["type"], "session.update");
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(url, dir.path().join("reply.wav"));
    config.handshake_timeout_ms = 250;
    let client = RealtimeClient::new(config).unwrap();

    match client.connect().await {
        Err(RealtimeError::HandshakeTimeout(_)) => {}
        other => panic!("expected handshake timeout, got {other:?}"),
    }
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_handshake_error_event_fails_connect() {
    let url = spawn_mock_peer(|mut peer| async move {
        next_json(&mut peer).await;
        send_json(
            &mut peer,
            serde_json::json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "invalid api key"},
            }),
        )
        .await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();

    match client.connect().await {
        Err(RealtimeError::Transport(reason)) => assert_eq!(reason, "invalid api key"),
        other => panic!("expected transport failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_second_turn_while_pending_fails_fast() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        // Hold the turn open long enough for the overlap attempt.
        tokio::time::sleep(Duration::from_secs(1)).await;
        send_json(&mut peer, text_delta("late")).await;
        send_json(&mut peer, done()).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();
    client.connect().await.unwrap();

    let first = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap();

    let overlap = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await;
    assert!(matches!(overlap, Err(RealtimeError::TurnInFlight)));

    // The original turn is unaffected by the rejected overlap.
    let output = first.wait().await.unwrap();
    assert_eq!(output.text, "late");
}

#[tokio::test]
async fn test_unknown_events_are_no_ops() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        send_json(
            &mut peer,
            serde_json::json!({"type": "response.created", "response": {"id": "resp_1"}}),
        )
        .await;
        send_json(
            &mut peer,
            serde_json::json!({"type": "rate_limits.updated", "rate_limits": []}),
        )
        .await;
        send_json(&mut peer, serde_json::json!({"type": "some.future.event"})).await;
        send_json(
            &mut peer,
            serde_json::json!({
                "type": "conversation.item.input_audio_transcription.completed",
                "item_id": "item_0",
                "transcript": "hello there",
            }),
        )
        .await;
        send_json(&mut peer, text_delta("still")).await;
        send_json(&mut peer, text_delta("alive")).await;
        send_json(&mut peer, done()).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();
    client.connect().await.unwrap();

    let output = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(output.text, "still alive");
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();

    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_turn_timeout_rejects_unresponsive_peer() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        // Never produce a terminal event.
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(url, dir.path().join("reply.wav"));
    config.turn_timeout_ms = Some(250);
    let client = RealtimeClient::new(config).unwrap();
    client.connect().await.unwrap();

    let handle = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap();
    assert!(matches!(handle.wait().await, Err(RealtimeError::Timeout(_))));
}

#[tokio::test]
async fn test_peer_disconnect_fails_pending_turn() {
    let url = spawn_mock_peer(|mut peer| async move {
        ack_handshake(&mut peer).await;
        read_upload(&mut peer).await;
        peer.close(None).await.unwrap();
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let client =
        RealtimeClient::new(test_config(url, dir.path().join("reply.wav"))).unwrap();
    client.connect().await.unwrap();

    let handle = client
        .submit_audio(AudioSource::RawPcm(vec![0u8; 32].into()))
        .await
        .unwrap();
    assert!(matches!(
        handle.wait().await,
        Err(RealtimeError::Transport(_))
    ));
}
