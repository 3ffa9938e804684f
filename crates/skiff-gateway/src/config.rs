use std::time::Duration;

use anyhow::Context;

/// Connection and retry tuning for the gateway.
///
/// Every timing knob lives here so tests can shrink them; the defaults
/// match the production server's expectations.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket endpoint, e.g. `ws://gateway.example.com/ws`.
    pub url: String,
    /// Ceiling for a single connection attempt, and for `connect()` as a
    /// whole. Default 10s.
    pub connect_timeout: Duration,
    /// First reconnect delay. Default 1s.
    pub backoff_base: Duration,
    /// Reconnect delay cap. Default 30s.
    pub backoff_cap: Duration,
    /// Consecutive failed attempts before the gateway stays disconnected
    /// until the next explicit `connect()`. Default 5.
    pub max_reconnect_attempts: u32,
    /// Ping cadence; two consecutive missed pongs drop the session.
    /// Default 15s.
    pub heartbeat_interval: Duration,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(15),
        }
    }

    /// Build from environment variables. `SKIFF_GATEWAY_URL` is required;
    /// the rest fall back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let url = std::env::var("SKIFF_GATEWAY_URL").context("SKIFF_GATEWAY_URL is not set")?;
        let mut config = Self::new(url);
        if let Ok(ms) = std::env::var("SKIFF_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(
                ms.parse().context("SKIFF_CONNECT_TIMEOUT_MS must be an integer")?,
            );
        }
        if let Ok(n) = std::env::var("SKIFF_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts =
                n.parse().context("SKIFF_MAX_RECONNECT_ATTEMPTS must be an integer")?;
        }
        Ok(config)
    }
}
