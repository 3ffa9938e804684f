/// Skiff stores: the in-memory canonical state fed by the gateway.
///
/// One message store and one notification store per session. All mutation
/// goes through the reducer methods here — no other component splices the
/// lists directly.

pub mod messages;
pub mod notifications;
pub mod views;

pub use messages::{ConversationKey, MessageDraft, MessageStore};
pub use notifications::{NotificationApi, NotificationStore};
