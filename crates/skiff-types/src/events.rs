use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, Notification, Reaction};

/// Envelope for every inbound frame on the multiplexed connection.
///
/// The server tags each frame with the topic it belongs to; the event body
/// is left opaque here and decoded by the normalizer once the topic class
/// is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    pub topic: String,
    #[serde(default)]
    pub event: serde_json::Value,
}

/// Commands sent FROM client TO server over the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving frames for a topic.
    Subscribe { topic: String },

    /// Stop receiving frames for a topic.
    Unsubscribe { topic: String },
}

/// A normalized event on a channel or user-inbox topic.
#[derive(Debug, Clone)]
pub enum MessageEvent {
    /// A message was posted. May be the echo of this client's own
    /// optimistic send, in which case `correlation_id` is set.
    Created(Message),

    /// Fields of an existing message changed. Only the fields present on
    /// the wire are carried; absent fields must be left untouched.
    Updated {
        id: String,
        content: Option<String>,
        reactions: Option<Vec<Reaction>>,
    },

    /// A message was removed.
    Deleted { id: String },
}

/// A normalized event on a notification topic.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// A new notification arrived. `unread_count` is the authoritative
    /// badge value when the server includes it.
    New {
        notification: Notification,
        unread_count: Option<u64>,
    },

    /// A notification was read (possibly on another device).
    Read {
        id: String,
        read_at: DateTime<Utc>,
        unread_count: Option<u64>,
    },

    /// Authoritative unread-count refresh; does not touch the list.
    CountUpdate { unread_count: u64 },
}
