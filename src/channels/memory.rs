//! In-process loopback transport.
//!
//! Scriptable from the outside: push session events, inspect what the bot
//! sent, make connects or sends fail. Cloning shares the same state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use crate::channels::transport::{
    ChatClient, EventReceiver, InboundMessage, SessionSpec, Transport, TransportEvent,
};
use crate::error::ChannelError;

/// A message the bot sent through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
}

#[derive(Default)]
struct State {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    session: u64,
    sent: Vec<SentMessage>,
    failing_connects: usize,
    failing_recipients: HashSet<String>,
    connect_times: Vec<Instant>,
}

#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
    sent_notify: Arc<Notify>,
    auto_ready: bool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Sessions become `Ready` as soon as they connect.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            sent_notify: Arc::new(Notify::new()),
            auto_ready: true,
        }
    }

    /// Sessions wait for an explicit `push(TransportEvent::Ready)`.
    pub fn manual() -> Self {
        Self {
            auto_ready: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver an event to the current session. Returns `false` when no
    /// session is listening.
    pub fn push(&self, event: TransportEvent) -> bool {
        self.lock()
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Simulate an inbound chat message.
    pub fn deliver(&self, from: &str, body: &str) -> bool {
        self.push(TransportEvent::Message(InboundMessage::new(from, body)))
    }

    /// Event sender of the current session, to simulate late events from it.
    pub fn current_sender(&self) -> Option<mpsc::UnboundedSender<TransportEvent>> {
        self.lock().events.clone()
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.lock().failing_connects = n;
    }

    /// Make every send to `to` fail.
    pub fn fail_sends_to(&self, to: &str) {
        self.lock().failing_recipients.insert(to.to_string());
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connect_times.len()
    }

    /// When each connect attempt happened, failed ones included.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.lock().connect_times.clone()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Drain the sent log.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Wait until at least `n` messages have been sent, then drain the log.
    pub async fn wait_for_sent(&self, n: usize, limit: Duration) -> Vec<SentMessage> {
        let deadline = Instant::now() + limit;
        loop {
            let notified = self.sent_notify.notified();
            if self.lock().sent.len() >= n {
                return self.take_sent();
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.take_sent();
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(
        &self,
        _spec: &SessionSpec,
    ) -> Result<(Arc<dyn ChatClient>, EventReceiver), ChannelError> {
        let mut state = self.lock();
        state.connect_times.push(Instant::now());
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(ChannelError::StartupFailed {
                name: "memory".into(),
                reason: "scripted connect failure".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if self.auto_ready {
            let _ = tx.send(TransportEvent::Ready);
        }
        state.events = Some(tx);
        state.session += 1;

        let client = MemoryClient {
            transport: self.clone(),
            session: state.session,
        };
        Ok((Arc::new(client), rx))
    }
}

struct MemoryClient {
    transport: MemoryTransport,
    session: u64,
}

#[async_trait]
impl ChatClient for MemoryClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        {
            let mut state = self.transport.lock();
            if state.failing_recipients.contains(to) {
                return Err(ChannelError::SendFailed {
                    name: "memory".into(),
                    reason: format!("scripted send failure to {to}"),
                });
            }
            state.sent.push(SentMessage {
                to: to.to_string(),
                body: body.to_string(),
            });
        }
        self.transport.sent_notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.transport.lock();
        if state.session == self.session {
            state.events = None;
        }
    }
}
