/// Wire event normalizer.
///
/// Pure decode step from an opaque frame body to a typed event. This is a
/// boundary layer: absent optional fields get defaults, ids arrive as
/// strings or numbers, and anything undecodable yields `None` — it never
/// raises to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use skiff_types::events::{MessageEvent, NotificationEvent};
use skiff_types::models::{Attachment, Message, Notification, Reaction};

/// Best-effort message frame body. Everything is optional on the wire.
#[derive(Debug, Default, Deserialize)]
struct MessageFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(rename = "messageId", default, deserialize_with = "lenient_id")]
    message_id: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    sender_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    recipient_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    channel_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_id")]
    thread_parent_id: Option<String>,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    reactions: Option<Vec<Reaction>>,
}

/// Best-effort notification frame body. The notification service emits
/// camelCase field names.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    notification_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    user_id: Option<String>,
    #[serde(default)]
    notification_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    is_read: Option<bool>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    unread_count: Option<u64>,
}

/// Decode a message-topic frame body. Returns `None` for bodies with no
/// usable id and for undecodable payloads.
pub fn message_event(body: &serde_json::Value) -> Option<MessageEvent> {
    let frame: MessageFrame = match serde_json::from_value(body.clone()) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("dropping malformed message frame: {e}");
            return None;
        }
    };

    match frame.kind.as_deref() {
        Some("DELETE") => {
            let id = frame.message_id.or(frame.id)?;
            Some(MessageEvent::Deleted { id })
        }
        Some("UPDATE") => {
            let id = frame.id.or(frame.message_id)?;
            Some(MessageEvent::Updated {
                id,
                content: frame.content,
                reactions: frame.reactions,
            })
        }
        // Absent or unrecognized tags are creates.
        _ => {
            let id = frame.id.or(frame.message_id)?;
            let attachment = frame.file_url.map(|url| Attachment {
                url,
                mime_type: frame.file_type.unwrap_or_default(),
                name: frame.file_name.unwrap_or_else(|| "file".to_string()),
            });
            Some(MessageEvent::Created(Message {
                id,
                sender_id: frame.sender_id.unwrap_or_default(),
                channel_id: frame.channel_id,
                recipient_id: frame.recipient_id,
                content: frame.content.unwrap_or_default(),
                timestamp: frame.timestamp.unwrap_or_else(Utc::now),
                thread_parent_id: frame.thread_parent_id,
                attachment,
                reactions: frame.reactions.unwrap_or_default(),
                correlation_id: frame.correlation_id,
                optimistic: false,
            }))
        }
    }
}

/// Decode a notification-topic frame body.
pub fn notification_event(body: &serde_json::Value) -> Option<NotificationEvent> {
    let frame: NotificationFrame = match serde_json::from_value(body.clone()) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("dropping malformed notification frame: {e}");
            return None;
        }
    };

    match frame.kind.as_deref() {
        Some("NEW_NOTIFICATION") => Some(NotificationEvent::New {
            notification: Notification {
                id: frame.notification_id.unwrap_or_default(),
                user_id: frame.user_id.unwrap_or_default(),
                kind: frame.notification_type.unwrap_or_else(|| "INFO".to_string()),
                title: frame.title.unwrap_or_default(),
                message: frame.message.unwrap_or_default(),
                metadata: frame.metadata.unwrap_or_default(),
                is_read: frame.is_read.unwrap_or(false),
                created_at: frame.created_at.unwrap_or_else(Utc::now),
                read_at: frame.read_at,
            },
            unread_count: frame.unread_count,
        }),
        Some("NOTIFICATION_READ") => Some(NotificationEvent::Read {
            id: frame.notification_id.unwrap_or_default(),
            read_at: frame.read_at.unwrap_or_else(Utc::now),
            unread_count: frame.unread_count,
        }),
        Some("NOTIFICATION_COUNT_UPDATE") => frame
            .unread_count
            .map(|unread_count| NotificationEvent::CountUpdate { unread_count }),
        other => {
            debug!(tag = ?other, "dropping notification frame with unknown tag");
            None
        }
    }
}

/// Ids arrive as strings or numbers depending on which service emitted
/// the frame; empty strings count as absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Timestamps that fail to parse are treated as absent rather than
/// poisoning the whole frame.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_str().map(str::to_string))
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}
