//! End-to-end dispatch tests over the in-process loopback transport.
//!
//! Each test wires the real connection manager, router and memory store
//! together, drives messages through `MemoryTransport`, and inspects what
//! the bot sent back.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use field_dispatch::bot::{Bot, Router};
use field_dispatch::channels::{
    ConnectionManager, ConnectionState, MemoryTransport, ReconnectPolicy, SentMessage,
    SessionSpec, TransportEvent,
};
use field_dispatch::config::BotConfig;
use field_dispatch::store::{DirectorySeed, MemoryStore, TaskStore};
use field_dispatch::tasks::{SystemClock, TaskService, TaskStatus};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const ADMIN: &str = "5491100000000@c.us";
const JUAN: &str = "5491122223333@c.us";

const DIRECTORY: &str = r#"{
    "workers": [
        {"id": "w1", "tenant_id": "t1", "full_name": "Juan Pérez", "phone": "+54 9 11 2222-3333"},
        {"id": "w2", "tenant_id": "t1", "full_name": "Ana Gómez", "phone": "5491133334444"}
    ],
    "sectors": [
        {"id": "s1", "name": "poda", "tenant_id": "t1", "campo_id": "c1"}
    ]
}"#;

struct Harness {
    transport: MemoryTransport,
    connection: Arc<ConnectionManager>,
    store: Arc<MemoryStore>,
    shutdown: Option<oneshot::Sender<()>>,
    bot: JoinHandle<()>,
}

impl Harness {
    async fn start() -> Self {
        let config = Arc::new(BotConfig::for_test(&[ADMIN]));
        let store = Arc::new(MemoryStore::new());
        DirectorySeed::from_json(DIRECTORY)
            .unwrap()
            .apply(store.as_ref())
            .await
            .unwrap();

        let transport = MemoryTransport::new();
        let (connection, inbound) = ConnectionManager::new(
            Arc::new(transport.clone()),
            SessionSpec {
                session_id: "test".into(),
                session_dir: std::env::temp_dir(),
            },
            ReconnectPolicy::new(config.reconnect_base, config.reconnect_max),
        );
        connection.start().await.unwrap();

        let service = Arc::new(TaskService::new(store.clone(), Arc::new(SystemClock)));
        let router = Router::new(config, service, store.clone(), connection.clone());
        let bot = Bot::new(router);

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            bot.run_until(inbound, async {
                let _ = rx.await;
            })
            .await;
        });

        let harness = Self {
            transport,
            connection,
            store,
            shutdown: Some(tx),
            bot: handle,
        };
        harness.wait_for_state(ConnectionState::Ready).await;
        harness
    }

    async fn wait_for_state(&self, wanted: ConnectionState) {
        timeout(TEST_TIMEOUT, async {
            while self.connection.state() != wanted {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection never reached the expected state");
    }

    async fn exchange(&self, from: &str, body: &str, replies: usize) -> Vec<SentMessage> {
        assert!(self.transport.deliver(from, body), "no live session");
        let sent = self.transport.wait_for_sent(replies, TEST_TIMEOUT).await;
        assert_eq!(sent.len(), replies, "unexpected replies: {sent:?}");
        sent
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(TEST_TIMEOUT, self.bot).await.unwrap().unwrap();
        self.connection.shutdown().await;
    }
}

fn tarea(desc: &str) -> String {
    let today = Local::now().date_naive();
    format!("/tarea\nsector: poda\nfecha: {today}\npeon: Juan +5491122223333\ndesc: {desc}")
}

#[tokio::test]
async fn admin_creates_and_worker_completes() {
    let h = Harness::start().await;

    let sent = h
        .exchange(
            ADMIN,
            "/tarea\nsector: poda\nfecha: 2025-03-01\npeon: Juan +5491122223333\ndesc: Podar fila 3",
            2,
        )
        .await;
    assert_eq!(sent[0].to, JUAN);
    assert!(sent[0].body.contains("Podar fila 3"));
    assert_eq!(sent[1].to, ADMIN);
    assert!(sent[1].body.contains("poda"));
    assert!(sent[1].body.contains("2025-03-01"));

    let tasks = h.store.find_pending_by_worker("w1", None).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let id = tasks[0].id;

    let sent = h.exchange(JUAN, &format!("#{id} 1"), 2).await;
    assert_eq!(sent[0].to, ADMIN);
    assert_eq!(sent[1].to, JUAN);
    assert!(sent[1].body.contains("COMPLETADA"));

    let task = h.store.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    h.stop().await;
}

#[tokio::test]
async fn replies_are_handled_in_arrival_order() {
    let h = Harness::start().await;
    for desc in ["A", "B", "C"] {
        h.exchange(ADMIN, &tarea(desc), 2).await;
    }

    for _ in 0..3 {
        assert!(h.transport.deliver(JUAN, "1"));
    }
    // Admin alert plus worker reply for each.
    let sent = h.transport.wait_for_sent(6, TEST_TIMEOUT).await;
    let worker_replies: Vec<_> = sent.iter().filter(|m| m.to == JUAN).collect();
    assert_eq!(worker_replies.len(), 3);

    let pending = h.store.find_pending_by_worker("w1", None).await.unwrap();
    assert!(pending.is_empty());

    // Latest pending first: C, then B, then A.
    let mut descriptions = Vec::new();
    for reply in &worker_replies {
        let id: i64 = reply
            .body
            .trim_start_matches("Tarea #")
            .split_whitespace()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let task = h
            .store
            .get_task(field_dispatch::tasks::TaskId(id))
            .await
            .unwrap()
            .unwrap();
        descriptions.push(task.description);
    }
    assert_eq!(descriptions, ["C", "B", "A"]);

    h.stop().await;
}

#[tokio::test]
async fn session_loss_recovers_and_keeps_serving() {
    let h = Harness::start().await;

    assert!(h.transport.push(TransportEvent::Disconnected("phone offline".into())));
    timeout(TEST_TIMEOUT, async {
        while h.transport.connect_count() < 2 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("no reconnect after session loss");
    h.wait_for_state(ConnectionState::Ready).await;

    let sent = h.exchange(ADMIN, "ping", 1).await;
    assert_eq!(sent[0].body, "pong");

    h.stop().await;
}

#[tokio::test]
async fn failed_reply_does_not_undo_the_update() {
    let h = Harness::start().await;
    h.exchange(ADMIN, &tarea("Regar"), 2).await;

    h.transport.fail_sends_to(JUAN);
    // Only the admin alert gets through.
    let sent = h.exchange(JUAN, "2 llovió", 1).await;
    assert_eq!(sent[0].to, ADMIN);

    let pending = h.store.find_pending_by_worker("w1", None).await.unwrap();
    assert!(pending.is_empty());

    h.stop().await;
}
