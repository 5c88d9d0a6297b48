//! Transport seam between the connection manager and a concrete chat
//! backend.
//!
//! A transport hands back a client for outbound sends plus a receiver of
//! session events. The connection manager owns the receiver; nothing else
//! registers callbacks on the transport.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::ChannelError;

/// Identity and storage location of one chat session.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub session_id: String,
    pub session_dir: PathBuf,
}

/// A text message received on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat address of the sender, e.g. `5491122223333@c.us`.
    pub from: String,
    pub body: String,
}

impl InboundMessage {
    pub fn new(from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            body: body.into(),
        }
    }
}

/// Session lifecycle and traffic, in the order the transport observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Pairing code or QR payload the operator must scan.
    AuthChallenge(String),
    Ready,
    AuthFailure(String),
    Disconnected(String),
    /// The transport has no further input to offer, e.g. stdin hit EOF.
    /// Terminal: the session is not reopened.
    Ended(String),
    Message(InboundMessage),
}

pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Stream of inbound messages handed to the router.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Outbound half of a live session.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError>;

    /// Tear the session down. Safe to call more than once.
    async fn close(&self);
}

/// Factory for chat sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Open a new session. Events for it arrive on the returned receiver;
    /// the receiver ending means the session is gone.
    async fn connect(
        &self,
        spec: &SessionSpec,
    ) -> Result<(Arc<dyn ChatClient>, EventReceiver), ChannelError>;
}
