use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use skiff_types::events::{GatewayCommand, WireFrame};

use crate::config::GatewayConfig;

/// Connection lifecycle. `Disconnected` is both the initial state and the
/// terminal state once the retry budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// `connect()` did not reach `Connected` within the configured timeout.
    /// The background retry loop may still be running.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// The retry budget ran out; only a new `connect()` resumes trying.
    #[error("reconnect budget exhausted")]
    RetriesExhausted,

    /// No live session. Normal and retryable, never fatal.
    #[error("gateway is not connected")]
    NotConnected,
}

/// The one physical connection to the real-time server.
///
/// Construct exactly one per process at bootstrap and pass clones around;
/// a clone is a cheap reference to the same underlying connection. All
/// reconnect timing is owned by a single supervisor task, cancelled as a
/// whole on `disconnect()`.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    config: GatewayConfig,

    state: RwLock<ConnectionState>,

    /// Every state transition is broadcast here — the registry uses it to
    /// invalidate subscriptions, UI uses it for connectivity badges.
    state_tx: broadcast::Sender<ConnectionState>,

    /// Decoded inbound frames, fanned out to whoever pumps them.
    frame_tx: broadcast::Sender<WireFrame>,

    /// Sender into the live session's write half; `None` while no session.
    outbound: Mutex<Option<mpsc::UnboundedSender<GatewayCommand>>>,

    supervisor: tokio::sync::Mutex<Option<JoinHandle<()>>>,

    /// Consecutive failed attempts, reset on success and on `connect()`.
    attempts: AtomicU32,

    /// Set when the supervisor gives up; cleared on the next `connect()`.
    exhausted: AtomicBool,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let (state_tx, _) = broadcast::channel(64);
        let (frame_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(GatewayInner {
                config,
                state: RwLock::new(ConnectionState::Disconnected),
                state_tx,
                frame_tx,
                outbound: Mutex::new(None),
                supervisor: tokio::sync::Mutex::new(None),
                attempts: AtomicU32::new(0),
                exhausted: AtomicBool::new(false),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read().expect("state lock poisoned")
    }

    /// Subscribe to state transitions.
    pub fn states(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to decoded inbound frames.
    pub fn frames(&self) -> broadcast::Receiver<WireFrame> {
        self.inner.frame_tx.subscribe()
    }

    /// Consecutive failed connection attempts so far.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// Establish the connection, starting the supervisor if needed.
    ///
    /// Idempotent: while already connected this resolves immediately, and
    /// concurrent callers share the same underlying attempt. Resolves once
    /// `Connected` is reached, or fails after `connect_timeout` while the
    /// background retry loop keeps going.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        // Subscribe before spawning so the Connected transition cannot be
        // missed between the two.
        let mut states = self.states();
        self.ensure_supervisor().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        let inner = self.inner.clone();
        let wait = async move {
            loop {
                match states.recv().await {
                    Ok(ConnectionState::Connected) => return Ok(()),
                    Ok(ConnectionState::Disconnected)
                        if inner.exhausted.load(Ordering::Acquire) =>
                    {
                        return Err(GatewayError::RetriesExhausted);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if *inner.state.read().expect("state lock poisoned")
                            == ConnectionState::Connected
                        {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(GatewayError::ConnectTimeout);
                    }
                }
            }
        };

        match tokio::time::timeout(self.inner.config.connect_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::ConnectTimeout),
        }
    }

    /// Tear down the transport. No effect when already disconnected, and
    /// never counts against the reconnect budget.
    pub async fn disconnect(&self) {
        let handle = self.inner.supervisor.lock().await.take();
        let Some(handle) = handle else { return };
        handle.abort();
        // Dropping the sender unblocks the session loop if the abort raced
        // past it, closing the socket.
        self.inner.outbound.lock().expect("outbound lock poisoned").take();
        set_state(&self.inner, ConnectionState::Disconnected);
        info!("gateway disconnected");
    }

    /// Queue an outbound command on the live session.
    pub fn send(&self, command: GatewayCommand) -> Result<(), GatewayError> {
        let guard = self.inner.outbound.lock().expect("outbound lock poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(GatewayError::NotConnected);
        };
        tx.send(command).map_err(|_| GatewayError::NotConnected)
    }

    async fn ensure_supervisor(&self) {
        let mut guard = self.inner.supervisor.lock().await;
        let running = guard.as_ref().is_some_and(|h| !h.is_finished());
        if running {
            return;
        }
        self.inner.attempts.store(0, Ordering::Release);
        self.inner.exhausted.store(false, Ordering::Release);
        let inner = self.inner.clone();
        *guard = Some(tokio::spawn(run_supervisor(inner)));
    }
}

#[cfg(test)]
impl Gateway {
    pub(crate) fn force_state(&self, state: ConnectionState) {
        set_state(&self.inner, state);
    }
}

/// Delay before the Nth consecutive retry (1-based):
/// `min(2^(N-1) * base, cap)`.
fn retry_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    cap.min(base.saturating_mul(1u32 << exp))
}

fn set_state(inner: &GatewayInner, next: ConnectionState) {
    {
        let mut state = inner.state.write().expect("state lock poisoned");
        if *state == next {
            return;
        }
        *state = next;
    }
    debug!(state = ?next, "gateway state changed");
    let _ = inner.state_tx.send(next);
}

/// Owns the whole connect/retry/session cycle. One instance of this task
/// exists at a time; every delay lives inside it, so cancelling the task
/// cancels all pending timers with it.
async fn run_supervisor(inner: Arc<GatewayInner>) {
    let mut attempt: u32 = 0;
    loop {
        set_state(&inner, ConnectionState::Connecting);
        match tokio::time::timeout(
            inner.config.connect_timeout,
            connect_async(inner.config.url.as_str()),
        )
        .await
        {
            Ok(Ok((stream, _))) => {
                info!(url = %inner.config.url, "gateway connected");
                attempt = 0;
                inner.attempts.store(0, Ordering::Release);
                set_state(&inner, ConnectionState::Connected);
                run_session(&inner, stream).await;
                warn!("gateway session ended");
            }
            Ok(Err(e)) => warn!("gateway connect failed: {e}"),
            Err(_) => warn!("gateway connect timed out"),
        }

        attempt += 1;
        inner.attempts.store(attempt, Ordering::Release);
        if attempt >= inner.config.max_reconnect_attempts {
            warn!(attempt, "reconnect budget exhausted, staying disconnected");
            inner.exhausted.store(true, Ordering::Release);
            set_state(&inner, ConnectionState::Disconnected);
            return;
        }
        set_state(&inner, ConnectionState::Disconnected);

        let delay = retry_delay(attempt, inner.config.backoff_base, inner.config.backoff_cap);
        debug!(?delay, attempt, "scheduling reconnect");
        tokio::time::sleep(delay).await;
    }
}

/// Pump one live session until the socket drops or the heartbeat budget
/// runs out. Any inbound traffic counts as proof of liveness, not just
/// pongs, so a chatty server never gets dropped by a lost pong.
async fn run_session(inner: &Arc<GatewayInner>, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewayCommand>();
    *inner.outbound.lock().expect("outbound lock poisoned") = Some(tx);

    let mut heartbeat = tokio::time::interval(inner.config.heartbeat_interval);
    heartbeat.tick().await;
    let mut alive = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            msg = source.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        alive = true;
                        match serde_json::from_str::<WireFrame>(&text) {
                            Ok(frame) => {
                                let _ = inner.frame_tx.send(frame);
                            }
                            Err(e) => debug!("dropping undecodable frame: {e}"),
                        }
                    }
                    Message::Ping(payload) => {
                        alive = true;
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => alive = true,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                let text = serde_json::to_string(&cmd).unwrap();
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if alive {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("heartbeat timeout (missed {} pongs), dropping session", missed_heartbeats);
                        break;
                    }
                }
                alive = false;
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    inner.outbound.lock().expect("outbound lock poisoned").take();
}
