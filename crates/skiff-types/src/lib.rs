/// Skiff shared types.
///
/// Domain models (messages, reactions, notifications), the normalized
/// event enums produced by the wire decoder, and the topic addressing
/// scheme shared between the gateway and the stores.

pub mod events;
pub mod models;
pub mod topic;

pub use events::{GatewayCommand, MessageEvent, NotificationEvent, WireFrame};
pub use models::{Attachment, Message, Notification, Reaction};
pub use topic::Topic;
