//! SalesMind application core.
//!
//! Holds the explicit application state that replaces the browser globals
//! (auth token, current session), the REST client for the training backend,
//! and the decoder for the streamed chat endpoint.

pub mod api;
pub mod app_state;
pub mod chat;
mod error;
pub mod sse;

pub use api::ApiClient;
pub use app_state::{AppSession, SessionProfile};
pub use chat::{ChatEvent, ChatReply, ChatStream};
pub use error::ApiError;
