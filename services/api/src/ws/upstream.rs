//! The connection to the upstream realtime voice API.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use salesmind_realtime_types::{ApiError, ClientEvent, ServerEvent};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::client::IntoClientRequest,
};
use tracing::info;

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the upstream socket with the API key and realtime beta headers.
pub async fn connect(url: &str, api_key: &SecretString) -> Result<UpstreamSocket> {
    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", api_key.expose_secret()).parse()?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to OpenAI Realtime WebSocket")?;
    info!("Connected to OpenAI Realtime API.");
    Ok(ws_stream)
}

/// Wraps raw little-endian PCM16 from the client into an append event.
pub fn audio_append(pcm16: &[u8]) -> Result<String> {
    let event = ClientEvent::InputAudioBufferAppend {
        audio: STANDARD.encode(pcm16),
    };
    Ok(serde_json::to_string(&event)?)
}

/// The first message a client sees once the upstream socket is open.
pub fn session_created(session_id: Option<&str>, username: &str) -> Result<String> {
    let event = ServerEvent::SessionCreated {
        session: json!({ "id": session_id.unwrap_or("new"), "user": username }),
    };
    Ok(serde_json::to_string(&event)?)
}

/// An `error` event in the same shape the upstream API uses.
pub fn error_event(kind: &str, message: impl Into<String>) -> Result<String> {
    let event = ServerEvent::Error {
        error: ApiError {
            kind: Some(kind.to_string()),
            code: None,
            message: Some(message.into()),
        },
    };
    Ok(serde_json::to_string(&event)?)
}

/// Best-effort `type` of a JSON text frame, for logging.
pub fn event_type(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_audio_append() {
        let frame = audio_append(&[0x01, 0x00, 0xFF, 0x7F]).unwrap();
        assert_eq!(
            parse(&frame),
            json!({ "type": "input_audio_buffer.append", "audio": "AQD/fw==" })
        );
    }

    #[test]
    fn test_session_created() {
        assert_eq!(
            parse(&session_created(None, "dana").unwrap()),
            json!({ "type": "session.created", "session": { "id": "new", "user": "dana" } })
        );
        assert_eq!(
            parse(&session_created(Some("s-1"), "dana").unwrap())["session"]["id"],
            "s-1"
        );
    }

    #[test]
    fn test_error_event() {
        assert_eq!(
            parse(&error_event("connection_error", "refused").unwrap()),
            json!({ "type": "error", "error": { "type": "connection_error", "message": "refused" } })
        );
    }

    #[test]
    fn test_event_type() {
        assert_eq!(event_type(r#"{"type":"response.create"}"#), "response.create");
        assert_eq!(event_type("garbage"), "unknown");
    }
}
