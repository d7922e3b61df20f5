//! Realtime voice-session client.
//!
//! [`RealtimeClient`] opens the `/ws/realtime/` WebSocket, performs the
//! session handshake, streams captured audio as PCM16 frames and reports
//! everything else as [`RealtimeEvent`]s on a single channel.
//!
//! ```no_run
//! # async fn run() -> salesmind_realtime::Result<()> {
//! use salesmind_realtime::{ChannelCapture, RealtimeClient, RealtimeConfig, RealtimeEvent, SessionHandle};
//!
//! let config = RealtimeConfig::parse("https://app.example.com")?;
//! let handle = SessionHandle::new("token").with_industry("Logistics");
//! let (mut client, mut events) = RealtimeClient::new(handle, config);
//! client.connect().await?;
//!
//! let (capture, _samples_tx) = ChannelCapture::new(16);
//! client.start_audio_stream(capture).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RealtimeEvent::Transcript { text, role, .. } => println!("{role}: {text}"),
//!         RealtimeEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod capture;
mod client;
pub mod config;
pub mod dispatch;
mod error;
mod event;
mod session;

pub use capture::{AudioCapture, ChannelCapture, SampleReceiver};
pub use client::RealtimeClient;
pub use config::{RealtimeConfig, VadSettings};
pub use error::{RealtimeError, Result};
pub use event::{ConnectionStatus, RealtimeEvent, TranscriptRole};
pub use salesmind_realtime_types as types;
pub use session::{DEFAULT_VOICE, SessionHandle};
