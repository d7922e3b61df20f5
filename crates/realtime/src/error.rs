use thiserror::Error;

/// Errors returned by the realtime adapter.
///
/// Server `error` messages and mid-session transport failures are reported
/// on the event channel as [`RealtimeEvent::Error`](crate::RealtimeEvent::Error);
/// the variants here are what a failing call itself returns.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The WebSocket could not be opened.
    #[error("WebSocket connection error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    /// Audio capture was refused (microphone permission denied).
    #[error("Audio capture permission denied: {0}")]
    PermissionDenied(String),
    /// Audio capture could not be started for a reason other than permission.
    #[error("Audio capture failed: {0}")]
    Capture(String),
    /// An operation that needs an open connection was called without one.
    #[error("Not connected to Realtime API")]
    NotConnected,
    /// The endpoint URL or session parameters are invalid.
    #[error("Invalid realtime configuration: {0}")]
    Configuration(String),
}

pub type Result<T, E = RealtimeError> = std::result::Result<T, E>;
