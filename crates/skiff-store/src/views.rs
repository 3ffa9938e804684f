/// Derived views over the message list.
///
/// Pure functions, recomputed on demand. They sit on top of the
/// reconciliation invariants: arrival order is stable, and a parent id
/// that no longer resolves marks the top of a thread chain.

use std::collections::HashSet;

use skiff_types::models::Message;

use crate::messages::ConversationKey;

/// Direct replies to the given message.
pub fn thread_replies<'a>(messages: &'a [Message], parent_id: &str) -> Vec<&'a Message> {
    messages
        .iter()
        .filter(|m| m.thread_parent_id.as_deref() == Some(parent_id))
        .collect()
}

/// The ancestor chain of a reply, root-first, excluding the message
/// itself. Walks parent ids until one no longer resolves, which is
/// treated as the top of the chain; a repeated id stops the walk rather
/// than looping.
pub fn thread_chain<'a>(messages: &'a [Message], id: &str) -> Vec<&'a Message> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(id.to_string());

    let mut current = messages.iter().find(|m| m.id == id);
    while let Some(message) = current {
        let Some(parent_id) = message.thread_parent_id.as_deref() else {
            break;
        };
        if !visited.insert(parent_id.to_string()) {
            break;
        }
        match messages.iter().find(|m| m.id == parent_id) {
            Some(parent) => {
                chain.insert(0, parent);
                current = Some(parent);
            }
            None => break,
        }
    }
    chain
}

/// The pinned subset of a conversation, in arrival order.
pub fn pinned<'a>(messages: &'a [Message], pinned_ids: &HashSet<String>) -> Vec<&'a Message> {
    messages.iter().filter(|m| pinned_ids.contains(&m.id)).collect()
}

/// The most recent message of a conversation, for sidebar previews.
pub fn latest_in<'a>(messages: &'a [Message], key: &ConversationKey) -> Option<&'a Message> {
    messages.iter().filter(|m| key.matches(m)).next_back()
}
