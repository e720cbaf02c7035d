//! WebSocket transport: upgrade route, per-connection session actor, and the
//! wire-level control frames clients exchange with the server.

mod frames;
mod session;

pub use frames::{ClientFrame, ServerFrame};
pub use session::{notifications_route, WsSession};
