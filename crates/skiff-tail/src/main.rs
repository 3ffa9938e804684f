/// skiff-tail: connect to a gateway and print every event on one topic.
///
/// Usage: `SKIFF_GATEWAY_URL=ws://host/ws skiff-tail channel/42`

use anyhow::Context;
use tracing::info;

use skiff_gateway::{ConnectionState, Gateway, GatewayConfig, Registry, SubscriptionHandle};
use skiff_types::Topic;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skiff=debug".into()),
        )
        .init();

    let raw_topic = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SKIFF_TAIL_TOPIC").ok())
        .context("usage: skiff-tail <topic>  (e.g. channel/42 or user/7/notifications)")?;
    let topic =
        Topic::parse(&raw_topic).with_context(|| format!("unrecognized topic: {raw_topic}"))?;

    let config = GatewayConfig::from_env()?;
    let gateway = Gateway::new(config);
    let registry = Registry::new(gateway.clone());
    let _pump = registry.spawn_pump();
    let mut states = gateway.states();

    gateway.connect().await?;
    info!(%topic, "tailing");
    let mut subscription = subscribe(&registry, &topic);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            state = states.recv() => {
                // Subscriptions die with the session; reattach once the
                // gateway comes back.
                if let Ok(ConnectionState::Connected) = state {
                    info!(%topic, "reconnected, re-subscribing");
                    subscription = subscribe(&registry, &topic);
                }
            }
        }
    }

    subscription.unsubscribe();
    gateway.disconnect().await;
    Ok(())
}

fn subscribe(registry: &Registry, topic: &Topic) -> SubscriptionHandle {
    match topic {
        Topic::Channel(id) => {
            registry.subscribe_to_channel(id, |event| info!(?event, "message"))
        }
        Topic::User(id) => registry.subscribe_to_user(id, |event| info!(?event, "message")),
        Topic::Notifications(id) => {
            registry.subscribe_to_notifications(id, |event| info!(?event, "notification"))
        }
    }
}
