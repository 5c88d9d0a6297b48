//! Connection manager — owns the single chat session and its reconnect loop.
//!
//! State machine:
//!
//! ```text
//! DISCONNECTED --start()--> CONNECTING --Ready--> READY
//!      ^                        |                   |
//!      +---- connect error -----+                   |
//!      +---- AuthFailure / Disconnected / EOF ------+--> schedule_reconnect()
//! ```
//!
//! `Ended` is terminal: no reconnect, and the inbound stream finishes once
//! queued messages are drained. The client stays usable until `shutdown()`.
//!
//! Transport events are consumed by a pump task per session. Each session
//! gets a generation number; events from a superseded session are dropped.
//! At most one reconnect timer exists at any time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channels::transport::{
    ChatClient, EventReceiver, InboundMessage, MessageStream, SessionSpec, Transport,
    TransportEvent,
};
use crate::error::ChannelError;

/// Session state as seen by the rest of the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
        };
        f.write_str(s)
    }
}

/// Linear, capped reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5_000),
            cap: Duration::from_millis(30_000),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the reconnect that follows `attempt` earlier failures:
    /// `min(cap, base * (attempt + 1))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(attempt.saturating_add(1))
            .min(self.cap)
    }
}

/// Outbound text delivery. Implemented by the connection manager; tests
/// substitute a recorder.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError>;
}

struct Inner {
    state: ConnectionState,
    client: Option<Arc<dyn ChatClient>>,
    attempt: u32,
    reconnect_scheduled: bool,
    generation: u64,
    shutting_down: bool,
    inbound: Option<mpsc::UnboundedSender<InboundMessage>>,
}

/// Owns the live chat session.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    spec: SessionSpec,
    policy: ReconnectPolicy,
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    /// Build a manager and the stream its sessions feed inbound messages into.
    pub fn new(
        transport: Arc<dyn Transport>,
        spec: SessionSpec,
        policy: ReconnectPolicy,
    ) -> (Arc<Self>, MessageStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            transport,
            spec,
            policy,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                client: None,
                attempt: 0,
                reconnect_scheduled: false,
                generation: 0,
                shutting_down: false,
                inbound: Some(tx),
            }),
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        (manager, Box::pin(stream))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Reconnects scheduled since the last `Ready`.
    pub fn reconnect_attempt(&self) -> u32 {
        self.lock().attempt
    }

    pub fn session_id(&self) -> &str {
        &self.spec.session_id
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Open a session unless one is already live or being opened.
    ///
    /// A transport failure is returned to the caller and does not schedule
    /// a retry.
    pub async fn start(self: &Arc<Self>) -> Result<(), ChannelError> {
        {
            let mut inner = self.lock();
            if inner.shutting_down {
                debug!("start() after shutdown ignored");
                return Ok(());
            }
            if inner.state != ConnectionState::Disconnected {
                debug!(state = %inner.state, "start() ignored, session already active");
                return Ok(());
            }
            inner.state = ConnectionState::Connecting;
        }
        info!(
            transport = self.transport.name(),
            session_id = %self.spec.session_id,
            "Connecting chat session"
        );

        match self.transport.connect(&self.spec).await {
            Ok((client, events)) => {
                let generation = {
                    let mut inner = self.lock();
                    inner.generation += 1;
                    inner.client = Some(client);
                    inner.generation
                };
                self.spawn_pump(generation, events);
                Ok(())
            }
            Err(e) => {
                self.lock().state = ConnectionState::Disconnected;
                warn!(transport = self.transport.name(), error = %e, "Chat session failed to start");
                Err(e)
            }
        }
    }

    /// Arrange for `start()` after the backoff delay. No-op while a
    /// reconnect is already pending.
    pub fn schedule_reconnect(self: &Arc<Self>, reason: &str) {
        let (delay, attempt) = {
            let mut inner = self.lock();
            if inner.shutting_down {
                return;
            }
            if inner.reconnect_scheduled {
                debug!(reason, "Reconnect already scheduled");
                return;
            }
            inner.reconnect_scheduled = true;
            let delay = self.policy.delay_for(inner.attempt);
            inner.attempt += 1;
            (delay, inner.attempt)
        };
        warn!(
            reason,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling chat reconnect"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.lock().reconnect_scheduled = false;
            if let Err(e) = this.start().await {
                this.schedule_reconnect(&e.to_string());
            }
        });
    }

    /// Send a text message over the current session.
    ///
    /// Delivery is attempted even when the session is not `Ready`. Nothing
    /// is queued.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let (state, client) = {
            let inner = self.lock();
            (inner.state, inner.client.clone())
        };
        if state != ConnectionState::Ready {
            warn!(%state, to, "Sending while chat session is not ready");
        }
        let client = client.ok_or(ChannelError::NotConnected)?;
        client.send_text(to, body).await.inspect_err(|e| {
            warn!(to, error = %e, "Chat send failed");
        })
    }

    /// Close the session, stop reconnecting and end the inbound stream.
    pub async fn shutdown(&self) {
        let client = {
            let mut inner = self.lock();
            inner.shutting_down = true;
            inner.inbound = None;
            inner.state = ConnectionState::Disconnected;
            inner.generation += 1;
            inner.client.take()
        };
        if let Some(client) = client {
            client.close().await;
        }
        info!("Chat session closed");
    }

    fn spawn_pump(self: &Arc<Self>, generation: u64, mut events: EventReceiver) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !this.handle_event(generation, event).await {
                    return;
                }
            }
            this.handle_event(
                generation,
                TransportEvent::Disconnected("event stream closed".into()),
            )
            .await;
        });
    }

    async fn session_lost(self: &Arc<Self>, generation: u64, err: ChannelError) {
        let client = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.generation += 1;
            inner.client.take()
        };
        warn!(error = %err, "Chat session lost");
        if let Some(client) = client {
            client.close().await;
        }
        self.schedule_reconnect(&err.to_string());
    }

    /// Apply one transport event. Returns `false` once the session is gone.
    async fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) -> bool {
        if self.lock().generation != generation {
            debug!(generation, "Dropping event from superseded session");
            return false;
        }

        match event {
            TransportEvent::AuthChallenge(code) => {
                warn!("Chat session needs pairing; scan the code from the console");
                eprintln!(
                    "\n[field-dispatch] pairing code for session '{}':\n{code}\n",
                    self.spec.session_id
                );
                true
            }
            TransportEvent::Ready => {
                {
                    let mut inner = self.lock();
                    inner.state = ConnectionState::Ready;
                    inner.attempt = 0;
                }
                info!(session_id = %self.spec.session_id, "Chat session ready");
                true
            }
            TransportEvent::AuthFailure(reason) => {
                let err = ChannelError::AuthFailed {
                    name: self.transport.name().to_string(),
                    reason,
                };
                self.session_lost(generation, err).await;
                false
            }
            TransportEvent::Disconnected(reason) => {
                let err = ChannelError::Disconnected {
                    name: self.transport.name().to_string(),
                    reason,
                };
                self.session_lost(generation, err).await;
                false
            }
            TransportEvent::Ended(reason) => {
                {
                    let mut inner = self.lock();
                    inner.shutting_down = true;
                    inner.inbound = None;
                }
                info!(reason, "Chat input ended; not reconnecting");
                false
            }
            TransportEvent::Message(msg) => {
                debug!(from = %msg.from, "Inbound message");
                let inbound = self.lock().inbound.clone();
                if inbound.is_none_or(|tx| tx.send(msg).is_err()) {
                    debug!("Inbound queue closed; message dropped");
                }
                true
            }
        }
    }
}

#[async_trait]
impl Outbound for ConnectionManager {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        ConnectionManager::send_text(self, to, body).await
    }
}
