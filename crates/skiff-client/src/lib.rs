/// Skiff client: bootstrap facade over the synchronization core.
///
/// A `SyncClient` is constructed once at application startup and owns the
/// one physical gateway connection, the subscription registry, both
/// stores, and the pump task wiring them together. Clone-by-reference
/// components are handed out through accessors; there is no hidden global
/// state.

use tokio::task::JoinHandle;

use skiff_gateway::{ConnectionState, Gateway, GatewayConfig, GatewayError, Registry, SubscriptionHandle};
use skiff_store::{MessageStore, NotificationApi, NotificationStore};
use skiff_types::events::{MessageEvent, NotificationEvent};

pub use skiff_gateway::{ConnectionState as State, GatewayConfig as Config};
pub use skiff_store::{ConversationKey, MessageDraft};

pub struct SyncClient<A: NotificationApi> {
    gateway: Gateway,
    registry: Registry,
    messages: MessageStore,
    notifications: NotificationStore,
    api: A,
    pump: JoinHandle<()>,
}

impl<A: NotificationApi> SyncClient<A> {
    /// Build the whole core around one connection. Call this once; pass
    /// the client (or its component clones) by reference afterwards.
    pub fn new(config: GatewayConfig, api: A) -> Self {
        let gateway = Gateway::new(config);
        let registry = Registry::new(gateway.clone());
        let pump = registry.spawn_pump();
        Self {
            gateway,
            registry,
            messages: MessageStore::new(),
            notifications: NotificationStore::new(),
            api,
            pump,
        }
    }

    // -- Connection --

    pub async fn connect(&self) -> Result<(), GatewayError> {
        self.gateway.connect().await
    }

    pub async fn disconnect(&self) {
        self.gateway.disconnect().await
    }

    pub fn state(&self) -> ConnectionState {
        self.gateway.state()
    }

    /// State transitions, for connectivity badges and re-subscription.
    pub fn states(&self) -> tokio::sync::broadcast::Receiver<ConnectionState> {
        self.gateway.states()
    }

    // -- Subscriptions --

    pub fn subscribe_to_channel(
        &self,
        channel_id: &str,
        handler: impl Fn(MessageEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.registry.subscribe_to_channel(channel_id, handler)
    }

    pub fn subscribe_to_user(
        &self,
        user_id: &str,
        handler: impl Fn(MessageEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.registry.subscribe_to_user(user_id, handler)
    }

    pub fn subscribe_to_notifications(
        &self,
        user_id: &str,
        handler: impl Fn(NotificationEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.registry.subscribe_to_notifications(user_id, handler)
    }

    /// Subscribe a channel feed straight into the owned message store.
    pub fn attach_channel(&self, channel_id: &str) -> SubscriptionHandle {
        let store = self.messages.clone();
        self.registry
            .subscribe_to_channel(channel_id, move |event| store.apply(event))
    }

    /// Subscribe a user's inbox feed straight into the owned message store.
    pub fn attach_user(&self, user_id: &str) -> SubscriptionHandle {
        let store = self.messages.clone();
        self.registry
            .subscribe_to_user(user_id, move |event| store.apply(event))
    }

    /// Subscribe a user's notification stream straight into the owned
    /// notification store.
    pub fn attach_notifications(&self, user_id: &str) -> SubscriptionHandle {
        let store = self.notifications.clone();
        self.registry
            .subscribe_to_notifications(user_id, move |event| store.apply(event))
    }

    // -- Stores --

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    /// Initial notification population; call once per user session.
    pub async fn bootstrap_notifications(&self) {
        self.notifications.bootstrap(&self.api).await
    }

    // -- Notification actions (REST first, store mutation on success) --

    pub async fn mark_notification_read(&self, id: &str) -> anyhow::Result<()> {
        self.notifications.mark_as_read(&self.api, id).await
    }

    pub async fn mark_all_notifications_read(&self) -> anyhow::Result<()> {
        self.notifications.mark_all_as_read(&self.api).await
    }

    pub async fn remove_notification(&self, id: &str) -> anyhow::Result<()> {
        self.notifications.remove(&self.api, id).await
    }

    pub async fn remove_all_notifications(&self) -> anyhow::Result<()> {
        self.notifications.remove_all(&self.api).await
    }
}

impl<A: NotificationApi> Drop for SyncClient<A> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
