/// Skiff gateway: the client side of the real-time connection.
///
/// Owns the single multiplexed WebSocket (connect, disconnect, automatic
/// reconnection with exponential backoff, heartbeat) and the topic
/// subscription registry that fans inbound frames out to per-topic
/// handlers after normalization.

pub mod config;
pub mod connection;
pub mod normalize;
pub mod registry;

pub use config::GatewayConfig;
pub use connection::{ConnectionState, Gateway, GatewayError};
pub use registry::{Registry, SubscriptionHandle};
