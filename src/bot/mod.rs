//! The dispatch bot — routing, handlers, and outbound notifications.
//!
//! Inbound messages are handled one at a time, in arrival order.

pub mod admin;
pub mod notify;
pub mod router;
pub mod templates;
pub mod worker;

use std::future::Future;

use futures::StreamExt;

pub use notify::NotificationDispatcher;
pub use router::Router;

use crate::channels::transport::MessageStream;

pub struct Bot {
    router: Router,
}

impl Bot {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Process messages until Ctrl+C or until the stream ends.
    pub async fn run(&self, inbound: MessageStream) {
        self.run_until(inbound, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Ctrl+C received, shutting down...");
        })
        .await;
    }

    /// Process messages until `shutdown` completes or the stream ends.
    pub async fn run_until<F>(&self, mut inbound: MessageStream, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("Dispatch bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                msg = inbound.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("Inbound stream ended, shutting down...");
                        break;
                    }
                },
            };
            self.router.handle(&message).await;
        }
    }
}
