use serde_json::Value;
use std::fmt;

/// Lifecycle of a realtime connection.
///
/// `Idle -> Connecting -> Connected -> (Recording <-> Connected) -> Disconnected`,
/// with `Error` reachable from any state on transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Recording,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    /// Whether the socket is open.
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Recording)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Recording => "recording",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Who produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    User,
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Everything a [`RealtimeClient`](crate::RealtimeClient) reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// The socket opened.
    Connected,
    /// The socket closed.
    Disconnected { code: u16, reason: String },
    /// The handshake finished; audio now flows.
    Ready,
    /// A finished user utterance or an incremental assistant transcript.
    Transcript {
        text: String,
        role: TranscriptRole,
        item_id: Option<String>,
    },
    /// A base64 PCM16 chunk of the assistant's voice.
    Audio { delta: String },
    /// The final `response.done` payload.
    Response { payload: Value },
    Error { message: String },
    StatusChange(ConnectionStatus),
    /// Server VAD detected the end of user speech.
    UserSpeechStopped { item_id: Option<String> },
}
