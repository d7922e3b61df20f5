//! Inbound message dispatch and handshake bookkeeping.
//!
//! The [`Dispatcher`] holds no I/O. The connection task feeds it every text
//! frame and acts on the returned [`Dispatch`]: send the outbound message if
//! any, then forward the events in order.

use crate::event::{RealtimeEvent, TranscriptRole};
use salesmind_realtime_types::{ClientEvent, ServerEvent, SessionConfig};
use tracing::{debug, error, warn};

/// The result of handling one inbound message.
#[derive(Debug, Default, PartialEq)]
pub struct Dispatch {
    pub outbound: Option<ClientEvent>,
    pub events: Vec<RealtimeEvent>,
}

impl Dispatch {
    fn event(event: RealtimeEvent) -> Self {
        Self {
            outbound: None,
            events: vec![event],
        }
    }
}

/// Per-connection protocol state.
#[derive(Debug)]
pub struct Dispatcher {
    session_config: SessionConfig,
    config_sent: bool,
    ready: bool,
    pending_item: Option<String>,
}

impl Dispatcher {
    pub fn new(session_config: SessionConfig) -> Self {
        Self {
            session_config,
            config_sent: false,
            ready: false,
            pending_item: None,
        }
    }

    /// True once `session.updated` acknowledged our configuration.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn config_sent(&self) -> bool {
        self.config_sent
    }

    pub fn pending_item(&self) -> Option<&str> {
        self.pending_item.as_deref()
    }

    /// Clears the handshake and pending transcript for a fresh connection.
    pub fn reset(&mut self) {
        self.config_sent = false;
        self.ready = false;
        self.pending_item = None;
    }

    /// Parses and dispatches one text frame. Unparseable frames are logged
    /// and produce nothing.
    pub fn handle_text(&mut self, text: &str) -> Dispatch {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => self.handle_event(event),
            Err(e) => {
                warn!(error = %e, "Failed to parse realtime message");
                Dispatch::default()
            }
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) -> Dispatch {
        debug!(event_type = event.event_type(), "Received realtime message");
        match event {
            ServerEvent::Error { error } => {
                error!(?error, "Realtime API error");
                let message = error
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                Dispatch::event(RealtimeEvent::Error { message })
            }
            ServerEvent::SessionCreated { .. } => {
                if self.config_sent {
                    warn!("session.created received again; session config already sent");
                    return Dispatch::default();
                }
                self.config_sent = true;
                Dispatch {
                    outbound: Some(ClientEvent::SessionUpdate {
                        session: self.session_config.clone(),
                    }),
                    events: Vec::new(),
                }
            }
            ServerEvent::SessionUpdated { .. } => {
                if !self.config_sent {
                    warn!("session.updated received before session config was sent");
                    return Dispatch::default();
                }
                if self.ready {
                    debug!("Session updated again");
                    return Dispatch::default();
                }
                self.ready = true;
                Dispatch::event(RealtimeEvent::Ready)
            }
            ServerEvent::SpeechStopped { item_id } => {
                self.pending_item = item_id.clone();
                Dispatch::event(RealtimeEvent::UserSpeechStopped { item_id })
            }
            ServerEvent::InputAudioTranscriptionCompleted {
                item_id,
                transcript,
            } => {
                let item_id = self.resolve_item(item_id);
                if transcript.is_empty() {
                    return Dispatch::default();
                }
                Dispatch::event(RealtimeEvent::Transcript {
                    text: transcript,
                    role: TranscriptRole::User,
                    item_id,
                })
            }
            ServerEvent::ResponseAudioTranscriptDelta { item_id, delta } => {
                if delta.is_empty() {
                    return Dispatch::default();
                }
                Dispatch::event(RealtimeEvent::Transcript {
                    text: delta,
                    role: TranscriptRole::Assistant,
                    item_id,
                })
            }
            ServerEvent::ResponseAudioDelta { delta, .. } => {
                if delta.is_empty() {
                    return Dispatch::default();
                }
                Dispatch::event(RealtimeEvent::Audio { delta })
            }
            ServerEvent::ResponseDone { response } => {
                Dispatch::event(RealtimeEvent::Response { payload: response })
            }
            ServerEvent::Unknown => Dispatch::default(),
        }
    }

    /// Attributes a completed transcription to the pending utterance.
    ///
    /// A completion carrying a different id than the pending one belongs to
    /// another utterance: it keeps its own id and the pending one stays.
    fn resolve_item(&mut self, item_id: Option<String>) -> Option<String> {
        match (self.pending_item.take(), item_id) {
            (Some(pending), Some(own)) if pending != own => {
                self.pending_item = Some(pending);
                Some(own)
            }
            (pending, own) => own.or(pending),
        }
    }
}
