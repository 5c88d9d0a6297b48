//! CLI transport — stdin/stdout REPL for local testing.
//!
//! Each input line is `<from>: <text>`, e.g. `5491122223333: 1`. Lines
//! without a sender prefix come from the configured local identity. Type
//! `\n` to break a `/tarea` block into lines. End of input stops the bot.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::channels::transport::{
    ChatClient, EventReceiver, InboundMessage, SessionSpec, Transport, TransportEvent,
};
use crate::error::ChannelError;
use crate::phone;

/// A transport that reads from stdin and writes to stdout.
pub struct CliTransport {
    local_sender: String,
}

impl CliTransport {
    /// `local_sender` is the phone used for lines without a `<from>:` prefix.
    pub fn new(local_sender: &str) -> Self {
        Self {
            local_sender: phone::chat_address(local_sender),
        }
    }
}

#[async_trait]
impl Transport for CliTransport {
    fn name(&self) -> &str {
        "cli"
    }

    async fn connect(
        &self,
        _spec: &SessionSpec,
    ) -> Result<(Arc<dyn ChatClient>, EventReceiver), ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Ready);

        let local_sender = self.local_sender.clone();
        tokio::spawn(async move {
            eprint!("> ");
            read_lines(BufReader::new(tokio::io::stdin()), &local_sender, &tx).await;
        });

        Ok((Arc::new(CliClient), rx))
    }
}

/// Forward input lines as messages until EOF, then report `Ended`.
async fn read_lines<R>(reader: R, local_sender: &str, tx: &mpsc::UnboundedSender<TransportEvent>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(msg) = parse_line(&line, local_sender) else {
                    eprint!("> ");
                    continue;
                };
                if tx.send(TransportEvent::Message(msg)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = tx.send(TransportEvent::Ended("stdin closed".into()));
                return;
            }
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                let _ = tx.send(TransportEvent::Ended(e.to_string()));
                return;
            }
        }
    }
}

struct CliClient;

#[async_trait]
impl ChatClient for CliClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        println!("\n[{to}]\n{body}\n");
        eprint!("> ");
        Ok(())
    }

    async fn close(&self) {}
}

/// Turn an input line into a message. Empty lines yield `None`.
fn parse_line(line: &str, local_sender: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (from, text) = match line.split_once(':') {
        Some((prefix, rest)) if is_sender(prefix) => {
            (phone::chat_address(prefix), rest.trim_start())
        }
        _ => (local_sender.to_string(), line),
    };

    let body = text.replace("\\n", "\n");
    Some(InboundMessage::new(from, body))
}

fn is_sender(prefix: &str) -> bool {
    let prefix = prefix.trim();
    let digits = phone::normalize(prefix);
    digits.len() >= 6 && prefix.chars().all(|c| c.is_ascii_digit() || c == '+' || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: &str = "5491100000000@c.us";

    #[test]
    fn sender_prefix_is_parsed() {
        let msg = parse_line("+54 9 11 2222 3333: 2 llovió", LOCAL).unwrap();
        assert_eq!(msg.from, "5491122223333@c.us");
        assert_eq!(msg.body, "2 llovió");
    }

    #[test]
    fn plain_text_uses_local_sender() {
        let msg = parse_line("ping", LOCAL).unwrap();
        assert_eq!(msg.from, LOCAL);
        assert_eq!(msg.body, "ping");
    }

    #[test]
    fn escaped_newlines_split_blocks() {
        let msg = parse_line(r"/tarea\nsector: poda\ndesc: a las 8:30", LOCAL).unwrap();
        assert_eq!(msg.from, LOCAL);
        assert_eq!(msg.body, "/tarea\nsector: poda\ndesc: a las 8:30");
    }

    #[test]
    fn empty_lines_are_skipped() {
        assert!(parse_line("   ", LOCAL).is_none());
    }

    #[tokio::test]
    async fn eof_ends_the_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"ping\n\n5491122223333: 1\n";
        read_lines(input, LOCAL, &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            [
                TransportEvent::Message(InboundMessage::new(LOCAL, "ping")),
                TransportEvent::Message(InboundMessage::new("5491122223333@c.us", "1")),
                TransportEvent::Ended("stdin closed".into()),
            ]
        );
    }
}
