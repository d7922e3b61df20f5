//! SalesMind Realtime Proxy Library Crate
//!
//! This library contains the server end of the `/ws/realtime/` voice
//! endpoint: token verification, the upstream realtime connection, and the
//! frame proxy between the two. The `api` binary is a thin wrapper around it.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
