use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use salesmind_realtime::{
    AudioCapture, ChannelCapture, ConnectionStatus, RealtimeClient, RealtimeConfig,
    RealtimeError, RealtimeEvent, SampleReceiver, SessionHandle, TranscriptRole,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_async, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use uuid::Uuid;

type ServerSocket = WebSocketStream<TcpStream>;
type Events = mpsc::UnboundedReceiver<RealtimeEvent>;

const SESSION_ID: &str = "0b6f5f0e-8f0e-4d3b-9a77-1c2d3e4f5a6b";
const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

async fn spawn_server() -> (String, JoinHandle<(ServerSocket, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("local addr should exist");

    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("server should accept");
        let query = Arc::new(Mutex::new(String::new()));
        let query_inner = Arc::clone(&query);
        let ws = accept_hdr_async(stream, move |req: &Request, response: Response| {
            *query_inner.lock().expect("query lock") = format!(
                "{}?{}",
                req.uri().path(),
                req.uri().query().unwrap_or_default()
            );
            Ok(response)
        })
        .await
        .expect("handshake should succeed");
        let query = query.lock().expect("query lock").clone();
        (ws, query)
    });

    (format!("http://{address}"), accept)
}

async fn connected_pair(block_size: usize) -> (RealtimeClient, Events, ServerSocket, String) {
    let (url, accept) = spawn_server().await;
    let mut config = RealtimeConfig::parse(&url).expect("config");
    config.block_size = block_size;
    let handle = SessionHandle::new("tok-123")
        .with_session_id(Uuid::parse_str(SESSION_ID).unwrap())
        .with_voice("verse");

    let (mut client, events) = RealtimeClient::new(handle, config);
    client.connect().await.expect("connect should succeed");
    let (server, query) = accept.await.expect("accept task");
    (client, events, server, query)
}

async fn next_event(events: &mut Events) -> RealtimeEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("event wait timed out")
        .expect("event channel closed")
}

async fn wait_for<F>(events: &mut Events, mut predicate: F) -> RealtimeEvent
where
    F: FnMut(&RealtimeEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return event;
        }
    }
}

async fn next_message(server: &mut ServerSocket) -> Message {
    timeout(WAIT, server.next())
        .await
        .expect("frame wait timed out")
        .expect("socket closed")
        .expect("frame error")
}

async fn next_json(server: &mut ServerSocket) -> Value {
    match next_message(server).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("client sent JSON"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn next_binary(server: &mut ServerSocket) -> Vec<u8> {
    match next_message(server).await {
        Message::Binary(data) => data.to_vec(),
        other => panic!("expected binary frame, got {other:?}"),
    }
}

async fn assert_quiet(server: &mut ServerSocket) {
    if let Ok(frame) = timeout(QUIET, server.next()).await {
        panic!("expected no frames, got {frame:?}");
    }
}

async fn send_json(server: &mut ServerSocket, value: Value) {
    server
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("server send");
}

async fn complete_handshake(server: &mut ServerSocket, events: &mut Events) -> Value {
    send_json(server, json!({ "type": "session.created", "session": { "id": "new" } })).await;
    let update = next_json(server).await;
    assert_eq!(update["type"], "session.update");
    send_json(server, json!({ "type": "session.updated", "session": {} })).await;
    wait_for(events, |e| *e == RealtimeEvent::Ready).await;
    update
}

struct DeniedCapture;

#[async_trait]
impl AudioCapture for DeniedCapture {
    async fn start(&mut self, _sample_rate: u32) -> salesmind_realtime::Result<SampleReceiver> {
        Err(RealtimeError::PermissionDenied("NotAllowedError".into()))
    }

    fn stop(&mut self) {}
}

#[tokio::test]
async fn connect_sends_token_and_session_and_reports_connected() {
    let (client, mut events, _server, query) = connected_pair(4).await;

    assert_eq!(
        query,
        format!("/ws/realtime/?token=tok-123&session_id={SESSION_ID}")
    );
    assert_eq!(
        next_event(&mut events).await,
        RealtimeEvent::StatusChange(ConnectionStatus::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        RealtimeEvent::StatusChange(ConnectionStatus::Connected)
    );
    assert_eq!(next_event(&mut events).await, RealtimeEvent::Connected);
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert!(!client.is_ready());
}

#[tokio::test]
async fn no_audio_frames_before_session_updated() {
    let (mut client, mut events, mut server, _) = connected_pair(4).await;
    let (capture, samples) = ChannelCapture::new(8);
    client.start_audio_stream(capture).await.expect("start audio");
    assert_eq!(client.status(), ConnectionStatus::Recording);

    samples.send(vec![0.5; 4]).await.unwrap();
    assert_quiet(&mut server).await;

    send_json(&mut server, json!({ "type": "session.created" })).await;
    assert_eq!(next_json(&mut server).await["type"], "session.update");

    samples.send(vec![0.25; 4]).await.unwrap();
    assert_quiet(&mut server).await;

    send_json(&mut server, json!({ "type": "session.updated" })).await;
    wait_for(&mut events, |e| *e == RealtimeEvent::Ready).await;
    assert!(client.is_ready());

    samples.send(vec![1.0, -1.0, 0.0, 2.0]).await.unwrap();
    assert_eq!(
        next_binary(&mut server).await,
        vec![0xFF, 0x7F, 0x00, 0x80, 0x00, 0x00, 0xFF, 0x7F]
    );
}

#[tokio::test]
async fn session_update_sent_once_when_created_repeats() {
    let (_client, mut events, mut server, _) = connected_pair(4).await;

    send_json(&mut server, json!({ "type": "session.created", "session": { "id": "proxy" } })).await;
    send_json(&mut server, json!({ "type": "session.created", "session": { "id": "upstream" } })).await;

    let update = next_json(&mut server).await;
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["voice"], "verse");
    assert_eq!(update["session"]["input_audio_format"], "pcm16");
    assert_eq!(update["session"]["output_audio_format"], "pcm16");
    assert_eq!(update["session"]["modalities"], json!(["text", "audio"]));
    assert_eq!(update["session"]["input_audio_transcription"]["model"], "whisper-1");
    assert_eq!(update["session"]["turn_detection"]["type"], "server_vad");
    assert_eq!(update["session"]["turn_detection"]["silence_duration_ms"], 500);

    assert_quiet(&mut server).await;

    send_json(&mut server, json!({ "type": "session.updated" })).await;
    wait_for(&mut events, |e| *e == RealtimeEvent::Ready).await;
    assert_quiet(&mut server).await;
}

#[tokio::test]
async fn stop_then_start_resumes_without_new_handshake() {
    let (mut client, mut events, mut server, _) = connected_pair(2).await;
    complete_handshake(&mut server, &mut events).await;

    let (first, first_tx) = ChannelCapture::new(8);
    client.start_audio_stream(first).await.expect("first start");
    first_tx.send(vec![0.0, 0.0]).await.unwrap();
    assert_eq!(next_binary(&mut server).await.len(), 4);

    client.stop_audio_stream();
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert!(!client.is_recording());
    assert!(client.is_ready());

    let (second, second_tx) = ChannelCapture::new(8);
    client.start_audio_stream(second).await.expect("second start");
    second_tx.send(vec![-1.0, -1.0]).await.unwrap();
    assert_eq!(next_binary(&mut server).await, vec![0x00, 0x80, 0x00, 0x80]);
    assert_quiet(&mut server).await;
}

#[tokio::test]
async fn second_start_while_recording_is_a_no_op() {
    let (mut client, _events, _server, _) = connected_pair(4).await;
    let (first, _first_tx) = ChannelCapture::new(1);
    client.start_audio_stream(first).await.unwrap();
    client.start_audio_stream(DeniedCapture).await.unwrap();
    assert!(client.is_recording());
}

#[tokio::test]
async fn permission_denied_is_returned_to_caller() {
    let (mut client, _events, _server, _) = connected_pair(4).await;
    let err = client.start_audio_stream(DeniedCapture).await.unwrap_err();
    assert!(matches!(err, RealtimeError::PermissionDenied(_)));
    assert!(!client.is_recording());
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn start_audio_without_connection_fails() {
    let config = RealtimeConfig::parse("http://127.0.0.1:9").unwrap();
    let (mut client, _events) = RealtimeClient::new(SessionHandle::new("t"), config);
    let (capture, _tx) = ChannelCapture::new(1);
    let err = client.start_audio_stream(capture).await.unwrap_err();
    assert!(matches!(err, RealtimeError::NotConnected));
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (mut client, mut events, mut server, _) = connected_pair(4).await;
    let (capture, _tx) = ChannelCapture::new(1);
    client.start_audio_stream(capture).await.unwrap();

    client.disconnect();
    client.disconnect();
    assert!(!client.is_recording());

    assert!(matches!(next_message(&mut server).await, Message::Close(_)));
    let disconnected = wait_for(&mut events, |e| matches!(e, RealtimeEvent::Disconnected { .. })).await;
    assert_eq!(
        disconnected,
        RealtimeEvent::Disconnected {
            code: 1000,
            reason: "Client disconnected".to_string()
        }
    );
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    client.disconnect();

    let config = RealtimeConfig::parse("http://127.0.0.1:9").unwrap();
    let (mut idle, _events) = RealtimeClient::new(SessionHandle::new("t"), config);
    idle.disconnect();
    idle.disconnect();
    assert_eq!(idle.status(), ConnectionStatus::Idle);
}

#[tokio::test]
async fn server_close_reports_code_and_reason() {
    let (mut client, mut events, mut server, _) = connected_pair(4).await;
    server
        .close(Some(CloseFrame {
            code: CloseCode::from(4001),
            reason: "unauthorized".to_string().into(),
        }))
        .await
        .expect("server close");

    let disconnected = wait_for(&mut events, |e| matches!(e, RealtimeEvent::Disconnected { .. })).await;
    assert_eq!(
        disconnected,
        RealtimeEvent::Disconnected {
            code: 4001,
            reason: "unauthorized".to_string()
        }
    );
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    let (capture, _tx) = ChannelCapture::new(1);
    assert!(matches!(
        client.start_audio_stream(capture).await,
        Err(RealtimeError::NotConnected)
    ));
}

#[tokio::test]
async fn connect_failure_reports_error_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let config = RealtimeConfig::parse(&format!("http://{address}")).unwrap();
    let (mut client, mut events) = RealtimeClient::new(SessionHandle::new("t"), config);
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, RealtimeError::Transport(_)));

    assert_eq!(
        next_event(&mut events).await,
        RealtimeEvent::StatusChange(ConnectionStatus::Connecting)
    );
    assert!(matches!(next_event(&mut events).await, RealtimeEvent::Error { .. }));
    assert_eq!(
        next_event(&mut events).await,
        RealtimeEvent::StatusChange(ConnectionStatus::Error)
    );
    assert_eq!(client.status(), ConnectionStatus::Error);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn server_messages_are_dispatched_in_order() {
    let (_client, mut events, mut server, _) = connected_pair(4).await;
    complete_handshake(&mut server, &mut events).await;

    for message in [
        json!({ "type": "input_audio_buffer.speech_stopped", "item_id": "X" }),
        json!({ "type": "conversation.item.input_audio_transcription.completed", "item_id": "X", "transcript": "hello" }),
        json!({ "type": "response.audio_transcript.delta", "item_id": "R", "delta": "A" }),
        json!({ "type": "response.audio_transcript.delta", "item_id": "R", "delta": "B" }),
        json!({ "type": "response.audio_transcript.delta", "item_id": "R", "delta": "C" }),
        json!({ "type": "response.audio.delta", "delta": "AAAA" }),
        json!({ "type": "response.done", "response": { "status": "completed" } }),
        json!({ "type": "error", "error": { "message": "rate limited" } }),
    ] {
        send_json(&mut server, message).await;
    }

    let mut received = Vec::new();
    while received.len() < 8 {
        received.push(next_event(&mut events).await);
    }

    let transcript = |text: &str, role, item: &str| RealtimeEvent::Transcript {
        text: text.to_string(),
        role,
        item_id: Some(item.to_string()),
    };
    assert_eq!(
        received,
        vec![
            RealtimeEvent::UserSpeechStopped {
                item_id: Some("X".to_string())
            },
            transcript("hello", TranscriptRole::User, "X"),
            transcript("A", TranscriptRole::Assistant, "R"),
            transcript("B", TranscriptRole::Assistant, "R"),
            transcript("C", TranscriptRole::Assistant, "R"),
            RealtimeEvent::Audio {
                delta: "AAAA".to_string()
            },
            RealtimeEvent::Response {
                payload: json!({ "status": "completed" })
            },
            RealtimeEvent::Error {
                message: "rate limited".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn reconnect_does_not_report_the_old_connection_closing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let mut sockets = Vec::new();
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.expect("server should accept");
            sockets.push(accept_async(stream).await.expect("handshake should succeed"));
        }
        sockets
    });

    let config = RealtimeConfig::parse(&format!("http://{address}")).unwrap();
    let (mut client, mut events) = RealtimeClient::new(SessionHandle::new("t"), config);
    client.connect().await.expect("first connect");
    wait_for(&mut events, |e| *e == RealtimeEvent::Connected).await;

    client.disconnect();
    client.connect().await.expect("second connect");
    let _sockets = timeout(WAIT, server).await.expect("accept timed out").unwrap();

    let mut received = Vec::new();
    while let Ok(Some(event)) = timeout(QUIET, events.recv()).await {
        received.push(event);
    }
    assert_eq!(
        received,
        vec![
            RealtimeEvent::StatusChange(ConnectionStatus::Connecting),
            RealtimeEvent::StatusChange(ConnectionStatus::Connected),
            RealtimeEvent::Connected,
        ]
    );
    assert_eq!(client.status(), ConnectionStatus::Connected);
}
