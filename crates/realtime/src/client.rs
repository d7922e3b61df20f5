//! The realtime voice-session adapter.

use crate::{
    audio::Pcm16Blocker,
    capture::{AudioCapture, SampleReceiver},
    config::RealtimeConfig,
    dispatch::Dispatcher,
    error::{RealtimeError, Result},
    event::{ConnectionStatus, RealtimeEvent},
    session::SessionHandle,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{Instrument, debug, error, info, trace, warn};

type RealtimeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_NO_STATUS: u16 = 1005;
const CLOSE_ABNORMAL: u16 = 1006;

/// Work handed from the client (and its audio pump) to the connection task.
#[derive(Debug)]
enum Command {
    Audio(Bytes),
    Close,
}

#[derive(Debug, Default)]
struct SharedState {
    status: ConnectionStatus,
    ready: bool,
    /// Bumped by every `connect()`; sinks of older connections go quiet.
    generation: u64,
}

/// Event channel plus the bits of state the owner can query synchronously.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::UnboundedSender<RealtimeEvent>,
    shared: Arc<Mutex<SharedState>>,
    /// `None` for the owner's sink, which is never stale.
    generation: Option<u64>,
}

impl EventSink {
    fn state(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a new connection generation and returns a sink bound to it.
    fn next_connection(&self) -> EventSink {
        let mut state = self.state();
        state.generation += 1;
        EventSink {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
            generation: Some(state.generation),
        }
    }

    fn is_stale(&self, state: &SharedState) -> bool {
        self.generation.is_some_and(|g| g != state.generation)
    }

    fn emit(&self, event: RealtimeEvent) {
        let state = self.state();
        if self.is_stale(&state) {
            trace!(?event, "Dropping event from a superseded connection");
            return;
        }
        // The owner may have dropped the receiver; events are then discarded.
        let _ = self.tx.send(event);
    }

    fn set_status(&self, status: ConnectionStatus) {
        let mut state = self.state();
        if self.is_stale(&state) {
            return;
        }
        state.status = status;
        let _ = self.tx.send(RealtimeEvent::StatusChange(status));
    }

    fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    fn set_ready(&self, ready: bool) {
        let mut state = self.state();
        if !self.is_stale(&state) {
            state.ready = ready;
        }
    }

    fn is_ready(&self) -> bool {
        self.state().ready
    }
}

struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

struct ActiveCapture {
    source: Box<dyn AudioCapture>,
    pump: JoinHandle<()>,
}

/// Manages one WebSocket voice session end to end.
///
/// Events are delivered on the receiver returned by [`RealtimeClient::new`].
/// The handshake (`session.created` -> `session.update` -> `session.updated`)
/// runs inside the connection task; audio blocks produced before it completes
/// are dropped. The client never reconnects on its own.
pub struct RealtimeClient {
    handle: SessionHandle,
    config: RealtimeConfig,
    sink: EventSink,
    connection: Option<Connection>,
    capture: Option<ActiveCapture>,
}

impl RealtimeClient {
    pub fn new(
        handle: SessionHandle,
        config: RealtimeConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            handle,
            config,
            sink: EventSink {
                tx,
                shared: Arc::new(Mutex::new(SharedState::default())),
                generation: None,
            },
            connection: None,
            capture: None,
        };
        (client, rx)
    }

    pub fn session(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn status(&self) -> ConnectionStatus {
        self.sink.status()
    }

    /// True once the server acknowledged the session configuration.
    pub fn is_ready(&self) -> bool {
        self.sink.is_ready()
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_some()
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| !c.task.is_finished())
    }

    /// Opens the socket. Returns once it is open; the handshake continues in
    /// the background and is signalled by [`RealtimeEvent::Ready`].
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            warn!("Already connected");
            return Ok(());
        }
        self.connection = None;
        // A previous connection task may still be tearing down.
        let sink = self.sink.next_connection();

        let url = match self.config.endpoint_url(&self.handle) {
            Ok(url) => url,
            Err(e) => {
                self.sink.emit(RealtimeEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        info!(
            host = url.host_str().unwrap_or_default(),
            session_id = ?self.handle.session_id(),
            "Connecting to Realtime API..."
        );
        self.sink.set_status(ConnectionStatus::Connecting);

        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                error!(error = %e, "Failed to connect to Realtime API");
                self.sink.emit(RealtimeEvent::Error {
                    message: format!("Connection failed: {e}"),
                });
                self.sink.set_status(ConnectionStatus::Error);
                return Err(RealtimeError::Transport(e));
            }
        };
        info!("WebSocket connected");

        sink.set_ready(false);
        sink.set_status(ConnectionStatus::Connected);
        sink.emit(RealtimeEvent::Connected);

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(self.config.session_config(&self.handle));
        let span = tracing::info_span!(
            "realtime_connection",
            session_id = ?self.handle.session_id()
        );
        let task = tokio::spawn(
            run_connection(socket, dispatcher, commands_rx, sink).instrument(span),
        );
        self.connection = Some(Connection { commands, task });
        Ok(())
    }

    /// Closes the socket and stops any capture. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.release_capture();
        if let Some(connection) = self.connection.take() {
            info!("Disconnecting from Realtime API");
            // A finished task has already dropped its receiver.
            let _ = connection.commands.send(Command::Close);
        }
        self.sink.set_ready(false);
    }

    /// Starts `capture` and streams its samples as PCM16 frames.
    ///
    /// Fails with [`RealtimeError::NotConnected`] without an open socket, or
    /// with whatever the capture source returns (e.g. permission denied).
    pub async fn start_audio_stream<C>(&mut self, capture: C) -> Result<()>
    where
        C: AudioCapture + 'static,
    {
        let commands = match &self.connection {
            Some(c) if !c.task.is_finished() && self.sink.status().is_open() => c.commands.clone(),
            _ => return Err(RealtimeError::NotConnected),
        };
        if self.capture.is_some() {
            warn!("Already recording");
            return Ok(());
        }

        info!("Starting audio stream...");
        let mut source: Box<dyn AudioCapture> = Box::new(capture);
        let samples = match source.start(self.config.sample_rate).await {
            Ok(samples) => samples,
            Err(e) => {
                error!(error = %e, "Failed to start audio stream");
                return Err(e);
            }
        };

        let blocker = Pcm16Blocker::new(self.config.block_size);
        let pump = tokio::spawn(pump_audio(samples, blocker, commands).in_current_span());
        self.capture = Some(ActiveCapture { source, pump });
        self.sink.set_status(ConnectionStatus::Recording);
        info!("Audio streaming started");
        Ok(())
    }

    /// Stops capture, leaving the socket (and the completed handshake) intact.
    pub fn stop_audio_stream(&mut self) {
        if self.release_capture() {
            info!("Audio streaming stopped");
        }
        if self.sink.status() == ConnectionStatus::Recording {
            self.sink.set_status(ConnectionStatus::Connected);
        }
    }

    fn release_capture(&mut self) -> bool {
        match self.capture.take() {
            Some(mut active) => {
                active.pump.abort();
                active.source.stop();
                true
            }
            None => false,
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Converts captured samples into fixed-size frames for the connection task.
async fn pump_audio(
    mut samples: SampleReceiver,
    mut blocker: Pcm16Blocker,
    commands: mpsc::UnboundedSender<Command>,
) {
    while let Some(chunk) = samples.recv().await {
        for frame in blocker.push(&chunk) {
            if commands.send(Command::Audio(frame)).is_err() {
                debug!("Connection closed; stopping audio pump");
                return;
            }
        }
    }
    debug!("Audio capture ended");
}

/// Owns the socket for the lifetime of one connection.
async fn run_connection(
    socket: RealtimeSocket,
    mut dispatcher: Dispatcher,
    mut commands: mpsc::UnboundedReceiver<Command>,
    sink: EventSink,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (code, reason) = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Audio(frame)) => {
                    if !dispatcher.is_ready() {
                        trace!(bytes = frame.len(), "Dropping audio frame before session is ready");
                        continue;
                    }
                    if let Err(e) = ws_tx.send(Message::Binary(frame)).await {
                        break transport_failure(&sink, e);
                    }
                }
                Some(Command::Close) | None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break (CLOSE_NORMAL, "Client disconnected".to_string());
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let dispatch = dispatcher.handle_text(text.as_str());
                    sink.set_ready(dispatcher.is_ready());
                    if let Some(outbound) = dispatch.outbound {
                        match serde_json::to_string(&outbound) {
                            Ok(json) => {
                                info!(event_type = outbound.event_type(), "Sending session config");
                                if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                                    break transport_failure(&sink, e);
                                }
                            }
                            Err(e) => error!(error = %e, "Failed to serialize outbound message"),
                        }
                    }
                    for event in dispatch.events {
                        sink.emit(event);
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "Ignoring binary frame from server");
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    info!(code, %reason, "WebSocket closed by server");
                    break (code, reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break transport_failure(&sink, e),
                None => break (CLOSE_ABNORMAL, String::new()),
            },
        }
    };

    dispatcher.reset();
    sink.set_ready(false);
    if sink.status() != ConnectionStatus::Error {
        sink.set_status(ConnectionStatus::Disconnected);
    }
    sink.emit(RealtimeEvent::Disconnected { code, reason });
}

fn transport_failure(
    sink: &EventSink,
    e: tokio_tungstenite::tungstenite::Error,
) -> (u16, String) {
    error!(error = %e, "WebSocket error");
    sink.emit(RealtimeEvent::Error {
        message: format!("WebSocket connection error: {e}"),
    });
    sink.set_status(ConnectionStatus::Error);
    (CLOSE_ABNORMAL, e.to_string())
}
