//! WebSocket layer: upgrade handling, control frames and the per-connection
//! session loops.
//!
//! The endpoint at `/api/v1/ws` upgrades an authenticated request and
//! hands the socket to [`session::run_session`].

pub mod handler;
pub mod messages;
pub mod session;

pub use session::{SessionSettings, SessionState};
