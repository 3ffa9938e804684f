use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as held in the canonical store.
///
/// `id` is assigned by the server, or is a locally-generated placeholder
/// while the entry is optimistic. Exactly one of `channel_id` and
/// `recipient_id` is set: channel messages carry the former, direct
/// messages the latter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub channel_id: Option<String>,
    pub recipient_id: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub thread_parent_id: Option<String>,
    pub attachment: Option<Attachment>,
    pub reactions: Vec<Reaction>,
    /// Client-generated id attached to an optimistic send and echoed back
    /// by the server, so the echo can replace the pending entry in place.
    pub correlation_id: Option<String>,
    /// True while this entry is a local send awaiting its server echo.
    pub optimistic: bool,
}

impl Message {
    /// Returns true if this message targets the given channel.
    pub fn in_channel(&self, channel_id: &str) -> bool {
        self.channel_id.as_deref() == Some(channel_id)
    }
}

/// File attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    /// MIME type as reported by the server, empty if unknown.
    pub mime_type: String,
    pub name: String,
}

/// One emoji reaction group on a message.
///
/// Invariant: `count` always equals `users.len()`. The store recomputes
/// both together on every toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: usize,
    pub users: Vec<String>,
}

/// A user-facing notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    /// Server-defined category tag, e.g. "INFO" or "TASK_ASSIGNED".
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}
