//! Service layer: the chat-side entry points into the fan-out and quote
//! pipelines.
//!
//! [`BroadcastGateway`] pushes confirmed message changes into the hub, and
//! [`CommandIntake`] diverts `/stock=` commands onto the command queue.

pub mod broadcast_gateway;
pub mod command_intake;

pub use broadcast_gateway::BroadcastGateway;
pub use command_intake::CommandIntake;
