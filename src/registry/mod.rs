//! Registries for live connections and topic subscriptions.
//!
//! These are the only shared mutable state in the server; everything else
//! resolves connections and topics by id through them.

mod connections;
mod topics;

pub use connections::{ConnectionRegistry, OutboundFrame, OutboundSender};
pub use topics::TopicRegistry;
