//! Wire types for the realtime voice protocol.
//!
//! These mirror the JSON messages exchanged over `/ws/realtime/`: the client
//! sends [`ClientEvent`]s and receives [`ServerEvent`]s. Only the subset of
//! the upstream protocol that SalesMind actually uses is modelled; anything
//! else deserializes to [`ServerEvent::Unknown`].

mod client_event;
mod server_event;
mod session;

pub use client_event::ClientEvent;
pub use server_event::{ApiError, ServerEvent};
pub use session::{AudioFormat, AudioTranscription, Modality, SessionConfig, TurnDetection};
