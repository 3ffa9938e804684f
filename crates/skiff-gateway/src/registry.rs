use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use skiff_types::events::{GatewayCommand, MessageEvent, NotificationEvent, WireFrame};
use skiff_types::topic::Topic;

use crate::connection::{ConnectionState, Gateway};
use crate::normalize;

type MessageHandler = Arc<dyn Fn(MessageEvent) + Send + Sync>;
type NotificationHandler = Arc<dyn Fn(NotificationEvent) + Send + Sync>;

#[derive(Clone)]
enum TopicHandler {
    Message(MessageHandler),
    Notification(NotificationHandler),
}

/// Maps logical topics to their attached consumers.
///
/// One underlying transport subscription exists per topic no matter how
/// many consumers attach: the first attach sends SUBSCRIBE upstream, the
/// last detach sends UNSUBSCRIBE, and inbound frames fan out to every
/// handler registered for the topic.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    gateway: Gateway,
    topics: RwLock<HashMap<Topic, HashMap<u64, TopicHandler>>>,
    next_token: AtomicU64,
}

impl Registry {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                gateway,
                topics: RwLock::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Receive every message posted to a group channel.
    pub fn subscribe_to_channel(
        &self,
        channel_id: &str,
        handler: impl Fn(MessageEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.attach(
            Topic::Channel(channel_id.to_string()),
            TopicHandler::Message(Arc::new(handler)),
        )
    }

    /// Receive every message addressed directly to a user.
    pub fn subscribe_to_user(
        &self,
        user_id: &str,
        handler: impl Fn(MessageEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.attach(
            Topic::User(user_id.to_string()),
            TopicHandler::Message(Arc::new(handler)),
        )
    }

    /// Receive a user's notification stream.
    pub fn subscribe_to_notifications(
        &self,
        user_id: &str,
        handler: impl Fn(NotificationEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.attach(
            Topic::Notifications(user_id.to_string()),
            TopicHandler::Notification(Arc::new(handler)),
        )
    }

    fn attach(&self, topic: Topic, handler: TopicHandler) -> SubscriptionHandle {
        // Subscriptions only exist on a live connection. The caller is
        // responsible for re-subscribing after a reconnect; handing back
        // an inert handle keeps "not connected" a normal condition.
        if self.inner.gateway.state() != ConnectionState::Connected {
            warn!(%topic, "not connected, returning inert subscription");
            return SubscriptionHandle::inert();
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let first_for_topic = {
            let mut topics = self.inner.topics.write().expect("topic table lock poisoned");
            let handlers = topics.entry(topic.clone()).or_default();
            let first = handlers.is_empty();
            handlers.insert(token, handler);
            first
        };

        if first_for_topic {
            if let Err(e) = self.inner.gateway.send(GatewayCommand::Subscribe {
                topic: topic.to_string(),
            }) {
                debug!(%topic, "subscribe command not sent: {e}");
            }
        }

        debug!(%topic, token, "subscribed");
        SubscriptionHandle {
            registry: Arc::downgrade(&self.inner),
            topic: Some(topic),
            token,
            active: AtomicBool::new(true),
        }
    }

    /// Route one inbound frame to every handler attached to its topic,
    /// normalizing the body per topic class. Frames for unknown topics
    /// and undecodable bodies are dropped.
    pub fn dispatch(&self, frame: &WireFrame) {
        let Some(topic) = Topic::parse(&frame.topic) else {
            debug!(topic = %frame.topic, "dropping frame for unparseable topic");
            return;
        };

        let handlers: Vec<TopicHandler> = {
            let topics = self.inner.topics.read().expect("topic table lock poisoned");
            match topics.get(&topic) {
                Some(handlers) => handlers.values().cloned().collect(),
                None => {
                    trace!(%topic, "no consumers for frame");
                    return;
                }
            }
        };

        if topic.is_message_topic() {
            let Some(event) = normalize::message_event(&frame.event) else {
                return;
            };
            for handler in &handlers {
                if let TopicHandler::Message(handler) = handler {
                    handler(event.clone());
                }
            }
        } else {
            let Some(event) = normalize::notification_event(&frame.event) else {
                return;
            };
            for handler in &handlers {
                if let TopicHandler::Notification(handler) = handler {
                    handler(event.clone());
                }
            }
        }
    }

    /// Spawn the pump that feeds `dispatch` from the gateway's frame
    /// broadcast and clears the topic table on every disconnect.
    pub fn spawn_pump(&self) -> JoinHandle<()> {
        let registry = self.clone();
        let mut frames = registry.inner.gateway.frames();
        let mut states = registry.inner.gateway.states();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = frames.recv() => match frame {
                        Ok(frame) => registry.dispatch(&frame),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("frame receiver lagged by {} frames", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    state = states.recv() => match state {
                        Ok(ConnectionState::Disconnected) => registry.invalidate(),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Drop all bookkeeping. Existing handles stay owned by their
    /// consumers; unsubscribing them later is a harmless no-op.
    fn invalidate(&self) {
        let mut topics = self.inner.topics.write().expect("topic table lock poisoned");
        if !topics.is_empty() {
            debug!(count = topics.len(), "invalidating subscriptions after disconnect");
            topics.clear();
        }
    }
}

/// Consumer-owned binding to one topic. Dropping the handle does NOT
/// unsubscribe; call `unsubscribe()` when the consumer detaches.
pub struct SubscriptionHandle {
    registry: Weak<RegistryInner>,
    topic: Option<Topic>,
    token: u64,
    active: AtomicBool,
}

impl SubscriptionHandle {
    /// A handle bound to nothing, returned when subscribing while
    /// disconnected.
    fn inert() -> Self {
        Self {
            registry: Weak::new(),
            topic: None,
            token: 0,
            active: AtomicBool::new(false),
        }
    }

    /// Whether this handle was live when created and has not been
    /// unsubscribed. A stale handle (invalidated by a disconnect) may
    /// still report true; unsubscribing it is harmless either way.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Detach this consumer. Idempotent: calling it twice, or on an
    /// inert/stale handle, never panics and has no additional effect.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let Some(topic) = &self.topic else {
            return;
        };

        let last_for_topic = {
            let mut topics = inner.topics.write().expect("topic table lock poisoned");
            match topics.get_mut(topic) {
                Some(handlers) => {
                    handlers.remove(&self.token);
                    let empty = handlers.is_empty();
                    if empty {
                        topics.remove(topic);
                    }
                    empty
                }
                // Already invalidated by a disconnect.
                None => false,
            }
        };

        if last_for_topic {
            let _ = inner.gateway.send(GatewayCommand::Unsubscribe {
                topic: topic.to_string(),
            });
        }
        debug!(%topic, token = self.token, "unsubscribed");
    }
}
