//! Manages one proxied realtime session, from authentication to teardown.

use super::{CLOSE_UNAUTHORIZED, CLOSE_UPSTREAM_UNAVAILABLE, upstream};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{Error as WsError, protocol::Message as WsMessage};
use tracing::{debug, error, info, instrument, warn};

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Debug, Default, Deserialize)]
pub struct RealtimeParams {
    pub token: Option<String>,
    pub session_id: Option<String>,
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
///
/// The upgrade is always accepted; authentication failures are reported with
/// close code 4001 so the client can tell them apart from network errors.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<RealtimeParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

#[instrument(
    name = "realtime_proxy",
    skip_all,
    fields(session_id = params.session_id.as_deref().unwrap_or("new"), user)
)]
async fn handle_socket(mut socket: WebSocket, params: RealtimeParams, state: Arc<AppState>) {
    let username = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => state.tokens.verify(token).await,
        None => {
            warn!("No auth token provided in WebSocket connection");
            None
        }
    };
    let Some(username) = username else {
        warn!("Rejecting WebSocket connection: invalid token");
        close(&mut socket, CLOSE_UNAUTHORIZED, "Unauthorized").await;
        return;
    };
    tracing::Span::current().record("user", username.as_str());
    info!("WebSocket connected");

    let upstream_socket =
        match upstream::connect(&state.config.upstream_url, &state.config.openai_api_key).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(error = ?e, "Failed to connect to OpenAI Realtime API");
                let message = format!("Failed to connect to OpenAI: {e}");
                if let Ok(event) = upstream::error_event("connection_error", message) {
                    let _ = socket.send(Message::Text(event.into())).await;
                }
                close(&mut socket, CLOSE_UPSTREAM_UNAVAILABLE, "Upstream unavailable").await;
                return;
            }
        };

    let created = match upstream::session_created(params.session_id.as_deref(), &username) {
        Ok(created) => created,
        Err(e) => {
            error!(error = ?e, "Failed to build session.created");
            return;
        }
    };
    if socket.send(Message::Text(created.into())).await.is_err() {
        info!("Client went away before the session started");
        return;
    }

    let (upstream_tx, upstream_rx) = upstream_socket.split();
    if let Err(e) = run_proxy(socket, upstream_tx, upstream_rx).await {
        error!(error = ?e, "Proxy session terminated with error.");
    }
    info!("Proxy session finished.");
}

/// Relays frames in both directions until either side closes.
async fn run_proxy<U, D>(socket: WebSocket, mut upstream_tx: U, mut upstream_rx: D) -> Result<()>
where
    U: Sink<WsMessage, Error = WsError> + Unpin,
    D: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let (mut client_tx, mut client_rx) = socket.split();

    let close_frame = loop {
        tokio::select! {
            msg = client_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    debug!(event_type = %upstream::event_type(text.as_str()), "Received from client");
                    if let Err(e) = upstream_tx.send(WsMessage::Text(text.as_str().to_owned().into())).await {
                        error!(error = %e, "Failed to forward client message");
                        let event = upstream::error_event("server_error", e.to_string())?;
                        client_tx.send(Message::Text(event.into())).await?;
                        break Some((CLOSE_INTERNAL_ERROR, "Upstream send failed"));
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let frame = upstream::audio_append(&data)?;
                    if let Err(e) = upstream_tx.send(WsMessage::Text(frame.into())).await {
                        error!(error = %e, "Failed to forward client audio");
                        break Some((CLOSE_INTERNAL_ERROR, "Upstream send failed"));
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection.");
                    let _ = upstream_tx.send(WsMessage::Close(None)).await;
                    break None;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    let _ = upstream_tx.send(WsMessage::Close(None)).await;
                    break None;
                }
            },
            msg = upstream_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    debug!(event_type = %upstream::event_type(text.as_str()), "Received from OpenAI");
                    if client_tx.send(Message::Text(text.as_str().to_owned().into())).await.is_err() {
                        info!("Client went away; closing upstream.");
                        let _ = upstream_tx.send(WsMessage::Close(None)).await;
                        break None;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    if client_tx.send(Message::Binary(data)).await.is_err() {
                        let _ = upstream_tx.send(WsMessage::Close(None)).await;
                        break None;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "OpenAI WebSocket connection closed");
                    break Some((CLOSE_NORMAL, "Upstream closed"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "Error receiving from OpenAI WebSocket");
                    let event = upstream::error_event("forwarding_error", e.to_string())?;
                    let _ = client_tx.send(Message::Text(event.into())).await;
                    break Some((CLOSE_INTERNAL_ERROR, "Upstream error"));
                }
                None => {
                    info!("OpenAI WebSocket stream ended");
                    break Some((CLOSE_NORMAL, "Upstream closed"));
                }
            },
        }
    };

    if let Some((code, reason)) = close_frame {
        let _ = client_tx
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })))
            .await;
    }
    Ok(())
}

async fn close(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}
