//! # chat-gateway
//!
//! Real-time delivery layer for a channel-based chat service.
//!
//! The crate fans channel-scoped events out to connected WebSocket
//! sessions and runs the stock-quote bot: chat messages of the form
//! `/stock=CODE` become commands on a durable queue, a dispatcher looks the
//! quote up, and a relay posts the reply back into the channel through the
//! same fan-out path. The message CRUD layer, persistence and
//! authentication live outside this crate; they call in through
//! [`service::BroadcastGateway`] and [`service::CommandIntake`].
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)            Message CRUD layer
//!     │                               │
//!     ├── WS Handler + Sessions (ws/) ├── BroadcastGateway (service/)
//!     │                               ├── CommandIntake (service/)
//!     │                               │        │
//!     └──────────── Hub (hub/) ◄──────┘   command queue (queue/)
//!                    ▲                         │
//!                    │                 CommandDispatcher (bot/)
//!                    │                         │
//!              ResponseRelay (bot/) ◄── response queue (queue/)
//! ```

pub mod api;
pub mod app_state;
pub mod bot;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod queue;
pub mod service;
pub mod ws;
