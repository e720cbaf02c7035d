//! HTTP adapters over the notification service for out-of-process callers.

mod handlers;

pub use handlers::{broadcast, notify_topic, notify_user, register_routes, stats};
