//! Notification delivery core: envelope type and the service facade that
//! resolves user/topic/broadcast targets and fans out to live connections.

mod envelope;
mod service;

pub use envelope::Envelope;
pub use service::{DeliveryEvent, NotificationService, Stats};
