//! Bridge transport — JSON frames over a WebSocket to a chat-web sidecar.
//!
//! The sidecar drives the actual chat web session; this side only speaks
//! the frame protocol below.
//!
//! Client → bridge:
//! - `{"type":"hello","session_id":…,"session_dir":…,"token":…}`
//! - `{"type":"send","id":…,"to":…,"body":…}`
//!
//! Bridge → client:
//! - `{"type":"qr","code":…}`
//! - `{"type":"ready"}`
//! - `{"type":"auth_failure","reason":…}`
//! - `{"type":"disconnected","reason":…}`
//! - `{"type":"message","from":…,"body":…}`

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::transport::{
    ChatClient, EventReceiver, InboundMessage, SessionSpec, Transport, TransportEvent,
};
use crate::error::ChannelError;

const NAME: &str = "bridge";

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    Hello {
        session_id: &'a str,
        session_dir: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<&'a str>,
    },
    Send {
        id: Uuid,
        to: &'a str,
        body: &'a str,
    },
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Qr {
        code: String,
    },
    Ready,
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message {
        from: String,
        body: String,
    },
}

impl From<BridgeFrame> for TransportEvent {
    fn from(frame: BridgeFrame) -> Self {
        match frame {
            BridgeFrame::Qr { code } => TransportEvent::AuthChallenge(code),
            BridgeFrame::Ready => TransportEvent::Ready,
            BridgeFrame::AuthFailure { reason } => TransportEvent::AuthFailure(reason),
            BridgeFrame::Disconnected { reason } => TransportEvent::Disconnected(reason),
            BridgeFrame::Message { from, body } => {
                TransportEvent::Message(InboundMessage { from, body })
            }
        }
    }
}

/// WebSocket bridge transport.
pub struct BridgeTransport {
    url: String,
    token: Option<SecretString>,
}

impl BridgeTransport {
    pub fn new(url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }
}

fn encode(frame: &ClientFrame<'_>) -> Result<Message, ChannelError> {
    serde_json::to_string(frame)
        .map(|json| Message::Text(json.into()))
        .map_err(|e| ChannelError::Protocol(e.to_string()))
}

#[async_trait]
impl Transport for BridgeTransport {
    fn name(&self) -> &str {
        NAME
    }

    async fn connect(
        &self,
        spec: &SessionSpec,
    ) -> Result<(Arc<dyn ChatClient>, EventReceiver), ChannelError> {
        let (ws, _response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| ChannelError::StartupFailed {
                    name: NAME.into(),
                    reason: format!("{}: {e}", self.url),
                })?;
        let (mut sink, mut stream) = ws.split();

        let hello = encode(&ClientFrame::Hello {
            session_id: &spec.session_id,
            session_dir: spec.session_dir.display().to_string(),
            token: self.token.as_ref().map(|t| t.expose_secret()),
        })?;
        sink.send(hello)
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: NAME.into(),
                reason: format!("hello failed: {e}"),
            })?;
        info!(url = %self.url, session_id = %spec.session_id, "Bridge connected");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
        tokio::spawn(async move {
            while let Some((msg, ack)) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                let written = sink.send(msg).await.map_err(|e| {
                    warn!(error = %e, "Bridge write failed");
                    ChannelError::SendFailed {
                        name: NAME.into(),
                        reason: e.to_string(),
                    }
                });
                let failed = written.is_err();
                if let Some(ack) = ack {
                    let _ = ack.send(written);
                }
                if failed || closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(Message::Text(text)) => match serde_json::from_str::<BridgeFrame>(&text) {
                        Ok(frame) => TransportEvent::from(frame),
                        Err(e) => {
                            warn!(error = %e, "Skipping unrecognized bridge frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "bridge closed the socket".into());
                        let _ = event_tx.send(TransportEvent::Disconnected(reason));
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Disconnected(e.to_string()));
                        return;
                    }
                };
                let lost = matches!(
                    event,
                    TransportEvent::Disconnected(_) | TransportEvent::AuthFailure(_)
                );
                if event_tx.send(event).is_err() || lost {
                    return;
                }
            }
            debug!("Bridge stream ended");
        });

        Ok((Arc::new(BridgeClient { out: out_tx }), event_rx))
    }
}

/// A frame for the writer task, with an optional channel for the write result.
type Outgoing = (Message, Option<oneshot::Sender<Result<(), ChannelError>>>);

struct BridgeClient {
    out: mpsc::UnboundedSender<Outgoing>,
}

fn socket_closed() -> ChannelError {
    ChannelError::Disconnected {
        name: NAME.into(),
        reason: "socket closed".into(),
    }
}

#[async_trait]
impl ChatClient for BridgeClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let frame = encode(&ClientFrame::Send {
            id: Uuid::new_v4(),
            to,
            body,
        })?;
        let (ack_tx, ack_rx) = oneshot::channel();
        self.out
            .send((frame, Some(ack_tx)))
            .map_err(|_| socket_closed())?;
        // The writer drops the ack when it exits before reaching this frame.
        ack_rx.await.map_err(|_| socket_closed())?
    }

    async fn close(&self) {
        let _ = self.out.send((Message::Close(None), None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bridge_frames() {
        let cases = [
            (r#"{"type":"qr","code":"2@abc"}"#, TransportEvent::AuthChallenge("2@abc".into())),
            (r#"{"type":"ready"}"#, TransportEvent::Ready),
            (
                r#"{"type":"auth_failure","reason":"logged out"}"#,
                TransportEvent::AuthFailure("logged out".into()),
            ),
            (r#"{"type":"disconnected"}"#, TransportEvent::Disconnected(String::new())),
            (
                r#"{"type":"message","from":"5491122223333@c.us","body":"1"}"#,
                TransportEvent::Message(InboundMessage::new("5491122223333@c.us", "1")),
            ),
        ];
        for (json, expected) in cases {
            let frame: BridgeFrame = serde_json::from_str(json).unwrap();
            assert_eq!(TransportEvent::from(frame), expected, "frame: {json}");
        }
    }

    #[test]
    fn unknown_frames_fail_to_decode() {
        assert!(serde_json::from_str::<BridgeFrame>(r#"{"type":"typing"}"#).is_err());
        assert!(serde_json::from_str::<BridgeFrame>("not json").is_err());
    }

    #[test]
    fn encodes_client_frames() {
        let hello = serde_json::to_value(ClientFrame::Hello {
            session_id: "field-dispatch",
            session_dir: "./data/session".into(),
            token: None,
        })
        .unwrap();
        assert_eq!(
            hello,
            serde_json::json!({"type": "hello", "session_id": "field-dispatch", "session_dir": "./data/session"})
        );

        let send = serde_json::to_value(ClientFrame::Send {
            id: Uuid::nil(),
            to: "1@c.us",
            body: "hola",
        })
        .unwrap();
        assert_eq!(send["type"], "send");
        assert_eq!(send["to"], "1@c.us");
        assert_eq!(send["body"], "hola");
    }
}
