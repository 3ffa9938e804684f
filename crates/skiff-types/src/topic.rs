use std::fmt;

/// Logical address a subscription binds to.
///
/// Wire form mirrors the server's destination scheme: `channel/{id}`,
/// `user/{id}`, `user/{id}/notifications`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// All messages posted to a group channel.
    Channel(String),
    /// Messages addressed directly to a user (their inbox feed).
    User(String),
    /// A user's notification stream.
    Notifications(String),
}

impl Topic {
    /// Parse a wire topic string. Returns `None` for anything that is not
    /// one of the three known shapes.
    pub fn parse(s: &str) -> Option<Topic> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["channel", id] if !id.is_empty() => Some(Topic::Channel((*id).to_string())),
            ["user", id] if !id.is_empty() => Some(Topic::User((*id).to_string())),
            ["user", id, "notifications"] if !id.is_empty() => {
                Some(Topic::Notifications((*id).to_string()))
            }
            _ => None,
        }
    }

    /// Whether this topic carries message events (as opposed to
    /// notification events).
    pub fn is_message_topic(&self) -> bool {
        matches!(self, Topic::Channel(_) | Topic::User(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Channel(id) => write!(f, "channel/{}", id),
            Topic::User(id) => write!(f, "user/{}", id),
            Topic::Notifications(id) => write!(f, "user/{}/notifications", id),
        }
    }
}
