use thiserror::Error;

/// Errors from the SalesMind REST backend and local session state.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not logged in")]
    NotAuthenticated,
    #[error("No active training session")]
    NoActiveSession,
    /// HTTP 401. The stored token is no longer valid and should be discarded.
    #[error("Authentication failed; please log in again")]
    Unauthorized,
    #[error("Request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// A terminal `error` event on the chat stream.
    #[error("Chat stream error: {message}")]
    Stream {
        message: String,
        upgrade_required: bool,
        landing_page_url: Option<String>,
    },
    #[error("Invalid API URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
