//! Worker handler — status reports and the pending-task list.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::bot::notify::NotificationDispatcher;
use crate::bot::templates;
use crate::commands::ParsedWorkerCommand;
use crate::error::{LookupError, TaskError};
use crate::store::traits::Directory;
use crate::tasks::model::{TaskId, Worker};
use crate::tasks::service::TaskService;

pub struct WorkerHandler {
    directory: Arc<dyn Directory>,
    tasks: Arc<TaskService>,
    notifier: Arc<NotificationDispatcher>,
    notify_admin: bool,
}

impl WorkerHandler {
    pub fn new(
        directory: Arc<dyn Directory>,
        tasks: Arc<TaskService>,
        notifier: Arc<NotificationDispatcher>,
        notify_admin: bool,
    ) -> Self {
        Self {
            directory,
            tasks,
            notifier,
            notify_admin,
        }
    }

    /// `Err` is the reply to send instead: not registered, or a lookup error.
    async fn resolve_sender(&self, sender_phone: &str) -> Result<Worker, String> {
        match self.directory.find_worker_by_phone(sender_phone).await {
            Ok(Some(worker)) => Ok(worker),
            Ok(None) => {
                let err = LookupError::UnknownSender(sender_phone.to_string());
                info!(error = %err, "Command from unregistered sender");
                Err(templates::not_found(&err))
            }
            Err(e) => {
                error!(sender = sender_phone, error = %e, "Worker lookup failed");
                Err(templates::internal_error())
            }
        }
    }

    /// Apply a status report and return the reply for the worker.
    pub async fn report(&self, sender_phone: &str, cmd: &ParsedWorkerCommand) -> String {
        let worker = match self.resolve_sender(sender_phone).await {
            Ok(worker) => worker,
            Err(reply) => return reply,
        };

        let task_id = match cmd.task_id.as_deref().map(|raw| (raw, raw.parse::<TaskId>())) {
            None => None,
            Some((_, Ok(id))) => Some(id),
            Some((raw, Err(_))) => {
                debug!(worker_id = %worker.id, task_ref = raw, "Non-numeric task reference");
                return templates::task_not_found(raw);
            }
        };

        let result = self
            .tasks
            .mark_task_status_from_worker(task_id, &worker.id, cmd.status, cmd.comment.as_deref())
            .await;

        match result {
            Ok(task) => {
                if self.notify_admin {
                    self.notifier.alert_admin(&task, &worker).await;
                }
                templates::status_updated(&task)
            }
            Err(TaskError::NotFoundOrNotOwned { task_id }) => {
                info!(worker_id = %worker.id, task_id = %task_id, "Report for unknown or foreign task");
                templates::task_not_found(&task_id)
            }
            Err(TaskError::NothingPending) => templates::nothing_pending(),
            Err(e) => {
                error!(worker_id = %worker.id, error = %e, "Failed to update task");
                templates::internal_error()
            }
        }
    }

    /// Today's pending tasks for the sender.
    pub async fn list_pending(&self, sender_phone: &str) -> String {
        let worker = match self.resolve_sender(sender_phone).await {
            Ok(worker) => worker,
            Err(reply) => return reply,
        };
        match self
            .tasks
            .get_pending_tasks(&worker.id, Some(self.tasks.today()))
            .await
        {
            Ok(tasks) => templates::pending_list(&tasks),
            Err(e) => {
                error!(worker_id = %worker.id, error = %e, "Failed to list pending tasks");
                templates::internal_error()
            }
        }
    }
}
