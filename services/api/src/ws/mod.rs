//! Realtime WebSocket Proxy
//!
//! - `session`: accepts the client socket, authenticates it and runs the proxy loop.
//! - `upstream`: connects to the voice API and builds the frames sent to it.

pub mod session;
mod upstream;

pub use session::ws_handler;

/// Close code for a missing or unknown token.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;
/// Close code for a failed upstream connection.
pub const CLOSE_UPSTREAM_UNAVAILABLE: u16 = 4002;
