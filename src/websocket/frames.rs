use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Control frames sent by clients, e.g. `{"action":"subscribe","topic":"jobs"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Identify {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Ping,
}

/// Frames the server sends back on the control path. Notification envelopes
/// are written to the socket as-is and do not go through this enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: Uuid,
    },
    Subscribed { topic: String },
    Unsubscribed { topic: String },
    Identified {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Pong,
    Error { message: String },
}
