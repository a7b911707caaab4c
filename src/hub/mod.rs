//! Connection registry: the hub actor, per-connection mailboxes and
//! membership statistics.

pub mod connection;
pub mod registry;
pub mod stats;

pub use connection::{Connection, Delivery, Mailbox};
pub use registry::Hub;
pub use stats::HubStats;
