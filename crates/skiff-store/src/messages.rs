use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, trace};
use uuid::Uuid;

use skiff_types::events::MessageEvent;
use skiff_types::models::{Attachment, Message, Reaction};

/// Selects one conversation's messages out of the canonical list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationKey {
    /// A group channel.
    Channel(String),
    /// A direct conversation between the local user and one peer; matches
    /// messages flowing in either direction.
    Direct { me: String, peer: String },
}

impl ConversationKey {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            ConversationKey::Channel(id) => message.in_channel(id),
            ConversationKey::Direct { me, peer } => {
                (message.sender_id == *me && message.recipient_id.as_deref() == Some(peer))
                    || (message.sender_id == *peer && message.recipient_id.as_deref() == Some(me))
            }
        }
    }
}

/// A local send before it has an identity.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub sender_id: String,
    pub channel_id: Option<String>,
    pub recipient_id: Option<String>,
    pub content: String,
    pub thread_parent_id: Option<String>,
    pub attachment: Option<Attachment>,
}

/// The canonical ordered message list, one per session.
///
/// The list is insertion-ordered by arrival and never re-sorted by
/// timestamp, so replacing an optimistic entry in place is well-defined.
/// Clones share the same underlying list.
#[derive(Clone, Default)]
pub struct MessageStore {
    inner: Arc<RwLock<Vec<Message>>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one inbound event into the list.
    pub fn apply(&self, event: MessageEvent) {
        match event {
            MessageEvent::Created(message) => self.apply_created(message),
            MessageEvent::Updated { id, content, reactions } => {
                self.apply_updated(&id, content, reactions)
            }
            MessageEvent::Deleted { id } => self.apply_deleted(&id),
        }
    }

    fn apply_created(&self, incoming: Message) {
        let mut messages = self.inner.write().expect("message list lock poisoned");

        // An echo of our own send replaces the pending entry in place.
        if let Some(correlation_id) = incoming.correlation_id.as_deref() {
            if let Some(slot) = messages
                .iter_mut()
                .find(|m| m.optimistic && m.correlation_id.as_deref() == Some(correlation_id))
            {
                trace!(id = %incoming.id, correlation_id, "echo confirmed optimistic entry");
                *slot = incoming;
                return;
            }
        }

        // The server may redeliver.
        if messages.iter().any(|m| m.id == incoming.id) {
            trace!(id = %incoming.id, "duplicate create ignored");
            return;
        }

        messages.push(incoming);
    }

    fn apply_updated(
        &self,
        id: &str,
        content: Option<String>,
        reactions: Option<Vec<Reaction>>,
    ) {
        let mut messages = self.inner.write().expect("message list lock poisoned");
        let Some(message) = messages.iter_mut().find(|m| m.id == id) else {
            // A stale update for a message not yet loaded is not an error.
            debug!(id, "update for unknown message ignored");
            return;
        };
        if let Some(content) = content {
            message.content = content;
        }
        if let Some(reactions) = reactions {
            message.reactions = reactions;
        }
    }

    fn apply_deleted(&self, id: &str) {
        let mut messages = self.inner.write().expect("message list lock poisoned");
        messages.retain(|m| m.id != id);
    }

    /// Append an optimistic entry for a local send. The returned message
    /// carries the fresh correlation id (also used as its placeholder id);
    /// the caller attaches that id to the REST send so the server echo can
    /// replace this entry.
    pub fn begin_send(&self, draft: MessageDraft) -> Message {
        let correlation_id = Uuid::new_v4().to_string();
        let message = Message {
            id: correlation_id.clone(),
            sender_id: draft.sender_id,
            channel_id: draft.channel_id,
            recipient_id: draft.recipient_id,
            content: draft.content,
            timestamp: Utc::now(),
            thread_parent_id: draft.thread_parent_id,
            attachment: draft.attachment,
            reactions: Vec::new(),
            correlation_id: Some(correlation_id),
            optimistic: true,
        };
        self.inner
            .write()
            .expect("message list lock poisoned")
            .push(message.clone());
        message
    }

    /// Toggle `user_id`'s reaction with `emoji` on a message. Builds a new
    /// reaction vector so consumers can rely on reference-identity change
    /// detection. Returns false if the message is unknown.
    pub fn toggle_reaction(&self, message_id: &str, emoji: &str, user_id: &str) -> bool {
        let mut messages = self.inner.write().expect("message list lock poisoned");
        let Some(message) = messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };

        let mut next = Vec::with_capacity(message.reactions.len() + 1);
        let mut seen = false;
        for reaction in &message.reactions {
            if reaction.emoji != emoji {
                next.push(reaction.clone());
                continue;
            }
            seen = true;
            let mut users = reaction.users.clone();
            match users.iter().position(|u| u == user_id) {
                Some(index) => {
                    users.remove(index);
                }
                None => users.push(user_id.to_string()),
            }
            // A reaction nobody holds disappears entirely.
            if users.is_empty() {
                continue;
            }
            next.push(Reaction {
                emoji: reaction.emoji.clone(),
                count: users.len(),
                users,
            });
        }
        if !seen {
            next.push(Reaction {
                emoji: emoji.to_string(),
                count: 1,
                users: vec![user_id.to_string()],
            });
        }
        message.reactions = next;
        true
    }

    /// Replace the whole list from a REST snapshot read.
    pub fn load_snapshot(&self, messages: Vec<Message>) {
        *self.inner.write().expect("message list lock poisoned") = messages;
    }

    /// One conversation's visible messages, in arrival order. Re-evaluated
    /// on every call; target membership is static per message so nothing
    /// is cached.
    pub fn conversation(&self, key: &ConversationKey) -> Vec<Message> {
        self.inner
            .read()
            .expect("message list lock poisoned")
            .iter()
            .filter(|m| key.matches(m))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Message> {
        self.inner.read().expect("message list lock poisoned").clone()
    }

    pub fn get(&self, id: &str) -> Option<Message> {
        self.inner
            .read()
            .expect("message list lock poisoned")
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("message list lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: &str, sender: &str, channel: &str, content: &str) -> MessageEvent {
        MessageEvent::Created(Message {
            id: id.to_string(),
            sender_id: sender.to_string(),
            channel_id: Some(channel.to_string()),
            recipient_id: None,
            content: content.to_string(),
            timestamp: Utc::now(),
            thread_parent_id: None,
            attachment: None,
            reactions: Vec::new(),
            correlation_id: None,
            optimistic: false,
        })
    }

    #[test]
    fn test_create_then_update() {
        let store = MessageStore::new();
        store.apply(created("7", "s1", "42", "hi"));
        store.apply(MessageEvent::Updated {
            id: "7".into(),
            content: Some("hi there".into()),
            reactions: None,
        });

        let visible = store.conversation(&ConversationKey::Channel("42".into()));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, "hi there");
    }

    #[test]
    fn test_redelivered_create_is_ignored() {
        let store = MessageStore::new();
        store.apply(created("7", "s1", "42", "hi"));
        store.apply(created("7", "s1", "42", "hi"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_echo_replaces_optimistic_entry_in_place() {
        let store = MessageStore::new();
        store.apply(created("1", "s2", "42", "before"));
        let pending = store.begin_send(MessageDraft {
            sender_id: "me".into(),
            channel_id: Some("42".into()),
            content: "sent".into(),
            ..Default::default()
        });
        store.apply(created("3", "s2", "42", "after"));

        let correlation_id = pending.correlation_id.clone().unwrap();
        let mut echo = Message {
            id: "server-9".into(),
            sender_id: "me".into(),
            channel_id: Some("42".into()),
            recipient_id: None,
            content: "sent".into(),
            timestamp: Utc::now(),
            thread_parent_id: None,
            attachment: None,
            reactions: Vec::new(),
            correlation_id: Some(correlation_id),
            optimistic: false,
        };
        store.apply(MessageEvent::Created(echo.clone()));

        let all = store.all();
        assert_eq!(all.len(), 3);
        // Same position as the optimistic entry, now authoritative.
        assert_eq!(all[1].id, "server-9");
        assert!(!all[1].optimistic);

        // The echo arriving twice changes nothing further.
        echo.content = "sent".into();
        store.apply(MessageEvent::Created(echo));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_create_without_correlation_appends() {
        let store = MessageStore::new();
        store.begin_send(MessageDraft {
            sender_id: "me".into(),
            channel_id: Some("42".into()),
            content: "sent".into(),
            ..Default::default()
        });
        // No correlation id: cannot be tied to the pending entry.
        store.apply(created("server-9", "me", "42", "sent"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MessageStore::new();
        store.apply(created("7", "s1", "42", "hi"));
        store.apply(MessageEvent::Deleted { id: "7".into() });
        store.apply(MessageEvent::Deleted { id: "7".into() });
        store.apply(MessageEvent::Deleted { id: "nope".into() });
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_for_unknown_id_is_ignored() {
        let store = MessageStore::new();
        store.apply(MessageEvent::Updated {
            id: "ghost".into(),
            content: Some("boo".into()),
            reactions: None,
        });
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_merges_only_present_fields() {
        let store = MessageStore::new();
        store.apply(created("7", "s1", "42", "hi"));
        store.toggle_reaction("7", "👍", "u1");

        store.apply(MessageEvent::Updated {
            id: "7".into(),
            content: None,
            reactions: None,
        });
        let message = store.get("7").unwrap();
        assert_eq!(message.content, "hi");
        assert_eq!(message.reactions.len(), 1);
    }

    #[test]
    fn test_reaction_toggle_invariant() {
        let store = MessageStore::new();
        store.apply(created("7", "s1", "42", "hi"));

        for round in 1..=6 {
            store.toggle_reaction("7", "🎉", "u1");
            let reactions = store.get("7").unwrap().reactions;
            if round % 2 == 1 {
                assert_eq!(reactions.len(), 1);
                assert_eq!(reactions[0].count, reactions[0].users.len());
                assert!(reactions[0].users.contains(&"u1".to_string()));
            } else {
                assert!(reactions.is_empty());
            }
        }
    }

    #[test]
    fn test_reaction_toggle_multiple_users() {
        let store = MessageStore::new();
        store.apply(created("7", "s1", "42", "hi"));
        store.toggle_reaction("7", "🎉", "u1");
        store.toggle_reaction("7", "🎉", "u2");
        store.toggle_reaction("7", "🚀", "u1");

        let reactions = store.get("7").unwrap().reactions;
        assert_eq!(reactions.len(), 2);
        assert_eq!(reactions[0].emoji, "🎉");
        assert_eq!(reactions[0].count, 2);
        assert_eq!(reactions[1].emoji, "🚀");
        assert_eq!(reactions[1].count, 1);

        store.toggle_reaction("7", "🎉", "u1");
        let reactions = store.get("7").unwrap().reactions;
        assert_eq!(reactions[0].count, 1);
        assert_eq!(reactions[0].users, vec!["u2".to_string()]);

        assert!(!store.toggle_reaction("ghost", "🎉", "u1"));
    }

    #[test]
    fn test_direct_conversation_matches_both_directions() {
        let store = MessageStore::new();
        let mut to_peer = match created("1", "me", "x", "out") {
            MessageEvent::Created(m) => m,
            _ => unreachable!(),
        };
        to_peer.channel_id = None;
        to_peer.recipient_id = Some("peer".into());
        let mut from_peer = match created("2", "peer", "x", "in") {
            MessageEvent::Created(m) => m,
            _ => unreachable!(),
        };
        from_peer.channel_id = None;
        from_peer.recipient_id = Some("me".into());
        let mut other = match created("3", "peer", "x", "elsewhere") {
            MessageEvent::Created(m) => m,
            _ => unreachable!(),
        };
        other.channel_id = None;
        other.recipient_id = Some("someone-else".into());

        store.apply(MessageEvent::Created(to_peer));
        store.apply(MessageEvent::Created(from_peer));
        store.apply(MessageEvent::Created(other));

        let key = ConversationKey::Direct { me: "me".into(), peer: "peer".into() };
        let visible = store.conversation(&key);
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].content, "out");
        assert_eq!(visible[1].content, "in");
    }

    #[test]
    fn test_load_snapshot_replaces_list() {
        let store = MessageStore::new();
        store.apply(created("old", "s1", "42", "stale"));
        let snapshot = match created("new", "s1", "42", "fresh") {
            MessageEvent::Created(m) => vec![m],
            _ => unreachable!(),
        };
        store.load_snapshot(snapshot);
        assert_eq!(store.len(), 1);
        assert!(store.get("new").is_some());
    }
}
