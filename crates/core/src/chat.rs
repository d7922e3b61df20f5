//! Streamed chat replies.

use crate::{error::ApiError, sse::SseDecoder};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::VecDeque, pin::Pin};
use tracing::{debug, warn};

/// Decoded chat events, in arrival order.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatEvent, ApiError>> + Send>>;

/// One `data:` frame of the chat stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Chunk {
        #[serde(default)]
        content: String,
    },
    Done(ChatDone),
    Error(ChatFailure),
}

/// Terminal success frame. Everything besides `full_response` (temperature,
/// SPIN stage, closing proposal...) is kept as opaque JSON.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatDone {
    #[serde(default)]
    pub full_response: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatFailure {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub upgrade_required: bool,
    #[serde(default)]
    pub landing_page_url: Option<String>,
}

impl From<ChatFailure> for ApiError {
    fn from(failure: ChatFailure) -> Self {
        ApiError::Stream {
            message: failure.error.unwrap_or_else(|| "Unknown error".to_string()),
            upgrade_required: failure.upgrade_required,
            landing_page_url: failure.landing_page_url,
        }
    }
}

/// Parses one frame payload. Malformed payloads are logged and skipped.
pub fn parse_chat_event(payload: &str) -> Option<ChatEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, payload, "Skipping malformed chat frame");
            None
        }
    }
}

/// Turns a response body into a stream of chat events.
///
/// A body error ends the stream after yielding it.
pub fn decode_chat_stream<S, E>(body: S) -> ChatStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ApiError>,
{
    struct State<S> {
        body: Pin<Box<S>>,
        decoder: SseDecoder,
        queue: VecDeque<Result<ChatEvent, ApiError>>,
        finished: bool,
    }

    let state = State {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(&chunk);
                    state
                        .queue
                        .extend(payloads.iter().filter_map(|p| parse_chat_event(p)).map(Ok));
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.queue.push_back(Err(e.into()));
                }
                None => {
                    state.finished = true;
                    if state.decoder.pending() > 0 {
                        debug!(bytes = state.decoder.pending(), "Flushing unterminated chat frame");
                    }
                    let tail = state.decoder.finish();
                    if let Some(event) = tail.as_deref().and_then(parse_chat_event) {
                        state.queue.push_back(Ok(event));
                    }
                }
            }
        }
    }))
}

/// The reply assembled from a chat stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub details: Map<String, Value>,
    pub finished: bool,
}

impl ChatReply {
    /// Applies one event. An `error` event is returned as [`ApiError::Stream`].
    pub fn apply(&mut self, event: ChatEvent) -> Result<(), ApiError> {
        match event {
            ChatEvent::Chunk { content } => self.text.push_str(&content),
            ChatEvent::Done(done) => {
                if let Some(full) = done.full_response {
                    self.text = full;
                }
                self.details = done.details;
                self.finished = true;
            }
            ChatEvent::Error(failure) => return Err(failure.into()),
        }
        Ok(())
    }
}

/// Drains `stream` into a [`ChatReply`], stopping at the terminal frame.
pub async fn collect_reply(mut stream: ChatStream) -> Result<ChatReply, ApiError> {
    let mut reply = ChatReply::default();
    while let Some(event) = stream.next().await {
        reply.apply(event?)?;
        if reply.finished {
            break;
        }
    }
    Ok(reply)
}
