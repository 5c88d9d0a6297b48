//! Message router — classifies the sender and dispatches to a handler.
//!
//! Every recognized command yields exactly one reply to the sender.
//! Unrecognized text is ignored.

use std::sync::Arc;

use tracing::debug;

use crate::bot::admin::AdminHandler;
use crate::bot::notify::NotificationDispatcher;
use crate::bot::templates;
use crate::bot::worker::WorkerHandler;
use crate::channels::connection::Outbound;
use crate::channels::transport::InboundMessage;
use crate::commands::{self, Command, Role};
use crate::config::BotConfig;
use crate::error::ParseError;
use crate::phone;
use crate::store::traits::Directory;
use crate::tasks::service::TaskService;

pub struct Router {
    config: Arc<BotConfig>,
    admin: AdminHandler,
    worker: WorkerHandler,
    notifier: Arc<NotificationDispatcher>,
}

impl Router {
    pub fn new(
        config: Arc<BotConfig>,
        tasks: Arc<TaskService>,
        directory: Arc<dyn Directory>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        let notifier = Arc::new(NotificationDispatcher::new(outbound));
        Self {
            admin: AdminHandler::new(Arc::clone(&directory), Arc::clone(&tasks), Arc::clone(&notifier)),
            worker: WorkerHandler::new(
                directory,
                tasks,
                Arc::clone(&notifier),
                config.notify_admin_on_update,
            ),
            notifier,
            config,
        }
    }

    pub fn role_of(&self, sender_phone: &str) -> Role {
        if self.config.is_admin(sender_phone) {
            Role::Admin
        } else {
            Role::Worker
        }
    }

    /// Compute the reply for a message, running any side effects.
    /// `None` means the message is ignored.
    pub async fn route(&self, msg: &InboundMessage) -> Option<String> {
        if !phone::is_direct_address(&msg.from) {
            debug!(from = %msg.from, "Ignoring non-direct chat");
            return None;
        }
        let sender = phone::normalize(&msg.from);
        if sender.is_empty() {
            debug!(from = %msg.from, "Ignoring sender without a phone");
            return None;
        }

        let role = self.role_of(&sender);
        debug!(sender = %sender, ?role, "Routing message");

        match commands::parse(&msg.body, role) {
            Ok(Command::Ping) => Some(templates::pong()),
            Ok(Command::CreateTask(cmd)) => Some(self.admin.create_task(&sender, &cmd).await),
            Ok(Command::ReportStatus(cmd)) => Some(self.worker.report(&sender, &cmd).await),
            Ok(Command::ListPending) => Some(self.worker.list_pending(&sender).await),
            Err(ParseError::NotACommand) => None,
            Err(ParseError::MissingFields(fields)) => Some(templates::admin_missing_fields(&fields)),
            Err(ParseError::InvalidDate(raw)) => Some(templates::admin_invalid_date(&raw)),
            Err(ParseError::MalformedWorkerReply) => Some(templates::worker_usage()),
        }
    }

    /// Route a message and send its reply, if any, back to the sender.
    pub async fn handle(&self, msg: &InboundMessage) {
        if let Some(reply) = self.route(msg).await {
            self.notifier.send(&msg.from, &reply).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::bot::testing::RecordingOutbound;
    use crate::store::memory::MemoryStore;
    use crate::store::traits::TaskStore;
    use crate::tasks::clock::FixedClock;
    use crate::tasks::model::{Sector, TaskStatus, Worker};

    const ADMIN: &str = "5491100000000@c.us";
    const JUAN: &str = "5491122223333@c.us";
    const ANA: &str = "5491133334444@c.us";
    const STRANGER: &str = "5491199999999@c.us";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    struct Fixture {
        router: Router,
        store: Arc<MemoryStore>,
        outbound: Arc<RecordingOutbound>,
    }

    impl Fixture {
        async fn send(&self, from: &str, body: &str) {
            self.router.handle(&InboundMessage::new(from, body)).await;
        }

        async fn pending(&self, worker_id: &str) -> Vec<crate::tasks::model::Task> {
            self.store.find_pending_by_worker(worker_id, None).await.unwrap()
        }
    }

    async fn fixture_with(config: BotConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for (id, name, phone) in [
            ("w1", "Juan Pérez", Some("+54 9 11 2222-3333")),
            ("w2", "Ana Gómez", Some("5491133334444")),
            ("w3", "Pedro Ruiz", None),
        ] {
            store
                .upsert_worker(&Worker {
                    id: id.into(),
                    tenant_id: "t1".into(),
                    full_name: name.into(),
                    phone: phone.map(str::to_string),
                })
                .await
                .unwrap();
        }
        store
            .upsert_sector(&Sector {
                id: "s1".into(),
                name: "poda".into(),
                tenant_id: "t1".into(),
                campo_id: "c1".into(),
            })
            .await
            .unwrap();

        let outbound = Arc::new(RecordingOutbound::default());
        let service = Arc::new(TaskService::new(
            store.clone(),
            Arc::new(FixedClock::new(today())),
        ));
        let router = Router::new(Arc::new(config), service, store.clone(), outbound.clone());
        Fixture {
            router,
            store,
            outbound,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(BotConfig::for_test(&[ADMIN])).await
    }

    fn tarea(peon: &str, desc: &str) -> String {
        format!("/tarea\nsector: poda\nfecha: 2025-03-01\npeon: {peon}\ndesc: {desc}")
    }

    #[tokio::test]
    async fn admin_creates_task_and_worker_is_notified() {
        let f = fixture().await;
        f.send(ADMIN, &tarea("Juan +5491122223333", "Podar fila 3")).await;

        let tasks = f.pending("w1").await;
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.sector_id, "s1");
        assert_eq!(task.date, today());
        assert_eq!(task.description, "Podar fila 3");
        assert_eq!(task.created_by_admin_id, "5491100000000");

        let sent = f.outbound.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, JUAN);
        assert!(sent[0].1.contains("Podar fila 3"));
        assert_eq!(sent[1].0, ADMIN);
        assert!(sent[1].1.contains("poda"));
        assert!(sent[1].1.contains("2025-03-01"));
    }

    #[tokio::test]
    async fn missing_fields_create_nothing() {
        let f = fixture().await;
        f.send(ADMIN, "/tarea\nsector: poda\npeon: Juan").await;

        assert!(f.pending("w1").await.is_empty());
        let sent = f.outbound.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Faltan campos: fecha, desc"));
        assert!(sent[0].1.contains("/tarea"));
    }

    #[tokio::test]
    async fn unknown_worker_or_sector_is_named() {
        let f = fixture().await;
        f.send(ADMIN, &tarea("Carlos", "x")).await;
        f.send(
            ADMIN,
            "/tarea\nsector: riego\nfecha: 2025-03-01\npeon: Juan\ndesc: x",
        )
        .await;

        let sent = f.outbound.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "No encontrado: peón Carlos");
        assert_eq!(sent[1].1, "No encontrado: sector riego");
        assert!(f.pending("w1").await.is_empty());
    }

    #[tokio::test]
    async fn worker_without_phone_is_reported_in_confirmation() {
        let f = fixture().await;
        f.send(ADMIN, &tarea("Pedro", "Regar")).await;

        assert_eq!(f.pending("w3").await.len(), 1);
        let sent = f.outbound.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ADMIN);
        assert!(sent[0].1.contains("no tiene teléfono"));
    }

    #[tokio::test]
    async fn failed_worker_notice_keeps_task() {
        let f = fixture().await;
        f.outbound.fail_sends_to(JUAN);
        f.send(ADMIN, &tarea("Juan", "Podar")).await;

        assert_eq!(f.pending("w1").await.len(), 1);
        let sent = f.outbound.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("No se pudo enviar el aviso"));
    }

    #[tokio::test]
    async fn later_report_overwrites_earlier() {
        let f = fixture().await;
        f.send(ADMIN, &tarea("Juan", "Podar")).await;
        let id = f.pending("w1").await[0].id;
        f.outbound.take();

        f.send(JUAN, "1").await;
        f.send(JUAN, &format!("#{id} 2 late")).await;

        let task = f.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Incomplete);
        assert_eq!(task.comment.as_deref(), Some("late"));

        let to_juan: Vec<_> = f
            .outbound
            .take()
            .into_iter()
            .filter(|(to, _)| to == JUAN)
            .collect();
        assert_eq!(to_juan.len(), 2);
        assert!(to_juan[0].1.contains("COMPLETADA"));
        assert!(to_juan[1].1.contains("INCOMPLETA"));
        assert!(to_juan[1].1.contains("late"));
    }

    #[tokio::test]
    async fn worker_cannot_touch_someone_elses_task() {
        let f = fixture().await;
        f.send(ADMIN, &tarea("Juan", "Podar")).await;
        let id = f.pending("w1").await[0].id;
        f.outbound.take();

        f.send(ANA, &format!("#{id} 1")).await;

        let task = f.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        let sent = f.outbound.take();
        assert_eq!(sent, vec![(ANA.to_string(), templates::task_not_found(&id.to_string()))]);
    }

    #[tokio::test]
    async fn implicit_reply_picks_latest_pending() {
        let f = fixture().await;
        for desc in ["A", "B", "C"] {
            f.send(ADMIN, &tarea("Juan", desc)).await;
        }
        f.outbound.take();

        f.send(JUAN, "1").await;

        let pending: Vec<_> = f.pending("w1").await.into_iter().map(|t| t.description).collect();
        assert_eq!(pending, ["A", "B"]);
    }

    #[tokio::test]
    async fn implicit_reply_with_nothing_pending() {
        let f = fixture().await;
        f.send(JUAN, "2 no había nada").await;
        assert_eq!(
            f.outbound.take(),
            vec![(JUAN.to_string(), templates::nothing_pending())]
        );
    }

    #[tokio::test]
    async fn admin_is_alerted_on_update() {
        let f = fixture().await;
        f.send(ADMIN, &tarea("Juan", "Podar")).await;
        f.outbound.take();

        f.send(JUAN, "2 llovió").await;

        let sent = f.outbound.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, ADMIN);
        assert!(sent[0].1.contains("Juan Pérez"));
        assert!(sent[0].1.contains("llovió"));
        assert_eq!(sent[1].0, JUAN);
    }

    #[tokio::test]
    async fn admin_alert_can_be_disabled() {
        let mut config = BotConfig::for_test(&[ADMIN]);
        config.notify_admin_on_update = false;
        let f = fixture_with(config).await;
        f.send(ADMIN, &tarea("Juan", "Podar")).await;
        f.outbound.take();

        f.send(JUAN, "1").await;
        let sent = f.outbound.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, JUAN);
    }

    #[tokio::test]
    async fn ping_answers_everyone() {
        let f = fixture().await;
        f.send(ADMIN, "ping").await;
        f.send(STRANGER, " PING ").await;
        let sent = f.outbound.take();
        assert_eq!(
            sent,
            vec![
                (ADMIN.to_string(), "pong".to_string()),
                (STRANGER.to_string(), "pong".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn free_text_is_ignored() {
        let f = fixture().await;
        f.send(JUAN, "buen día").await;
        f.send(ADMIN, "¿cómo va todo?").await;
        f.send(STRANGER, "hola").await;
        assert!(f.outbound.take().is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_gets_usage() {
        let f = fixture().await;
        f.send(JUAN, "3").await;
        assert_eq!(
            f.outbound.take(),
            vec![(JUAN.to_string(), templates::worker_usage())]
        );
    }

    #[tokio::test]
    async fn unregistered_sender_is_told_once() {
        let f = fixture().await;
        f.send(STRANGER, "1").await;
        assert_eq!(
            f.outbound.take(),
            vec![(STRANGER.to_string(), templates::not_registered())]
        );
    }

    #[tokio::test]
    async fn non_numeric_task_id_is_not_found() {
        let f = fixture().await;
        f.send(JUAN, "#abc 1").await;
        assert_eq!(
            f.outbound.take(),
            vec![(JUAN.to_string(), templates::task_not_found("abc"))]
        );
    }

    #[tokio::test]
    async fn group_messages_are_ignored() {
        let f = fixture().await;
        f.send("120363000000000000@g.us", "ping").await;
        f.send("status@broadcast", "1").await;
        assert!(f.outbound.take().is_empty());
    }

    #[tokio::test]
    async fn pending_list_for_worker() {
        let f = fixture().await;
        f.send(ADMIN, &tarea("Juan", "Podar fila 3")).await;
        f.outbound.take();

        f.send(JUAN, "pendientes").await;
        let sent = f.outbound.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Podar fila 3"));
    }
}
