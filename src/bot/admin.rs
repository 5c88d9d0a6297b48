//! Admin handler — turns a parsed `/tarea` block into a task.

use std::sync::Arc;

use tracing::{error, info};

use crate::bot::notify::NotificationDispatcher;
use crate::bot::templates;
use crate::commands::ParsedAdminCommand;
use crate::error::LookupError;
use crate::store::traits::Directory;
use crate::tasks::model::{Sector, Worker};
use crate::tasks::service::{CreateTasks, TaskService};

pub struct AdminHandler {
    directory: Arc<dyn Directory>,
    tasks: Arc<TaskService>,
    notifier: Arc<NotificationDispatcher>,
}

impl AdminHandler {
    pub fn new(
        directory: Arc<dyn Directory>,
        tasks: Arc<TaskService>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            directory,
            tasks,
            notifier,
        }
    }

    /// Resolve worker and sector, create the task, notify the worker.
    ///
    /// Returns the single reply for the admin. Nothing is created when a
    /// lookup fails.
    pub async fn create_task(&self, admin_phone: &str, cmd: &ParsedAdminCommand) -> String {
        let (worker, sector) = match self.resolve(cmd).await {
            Ok(found) => found,
            Err(reply) => {
                info!(admin = admin_phone, "Task not created");
                return reply;
            }
        };

        let request = CreateTasks {
            tenant_id: worker.tenant_id.clone(),
            sector_id: sector.id.clone(),
            worker_ids: vec![worker.id.clone()],
            description: cmd.description.clone(),
            date: cmd.date,
            created_by_admin_id: admin_phone.to_string(),
            comment: cmd.comment.clone(),
        };
        let task = match self.tasks.create_tasks_from_admin_command(request).await {
            Ok(tasks) => match tasks.into_iter().next() {
                Some(task) => task,
                None => {
                    error!(admin = admin_phone, "Task batch came back empty");
                    return templates::internal_error();
                }
            },
            Err(e) => {
                error!(admin = admin_phone, error = %e, "Failed to create task");
                return templates::internal_error();
            }
        };

        let notice = self.notifier.notify_worker(&worker, &task, &sector).await;
        templates::task_created(&task, &sector, &worker, notice)
    }

    /// `Err` carries the reply for a lookup miss or a storage failure.
    async fn resolve(&self, cmd: &ParsedAdminCommand) -> Result<(Worker, Sector), String> {
        let worker = self
            .directory
            .find_worker_by_name_or_phone(Some(&cmd.worker_name), cmd.worker_phone.as_deref())
            .await
            .map_err(|e| {
                error!(error = %e, "Worker lookup failed");
                templates::internal_error()
            })?;
        let Some(worker) = worker else {
            return Err(templates::not_found(&LookupError::WorkerNotFound(
                cmd.worker_name.clone(),
            )));
        };

        let sector = self
            .directory
            .find_sector_by_name(&worker.tenant_id, &cmd.sector)
            .await
            .map_err(|e| {
                error!(error = %e, "Sector lookup failed");
                templates::internal_error()
            })?;
        match sector {
            Some(sector) => Ok((worker, sector)),
            None => Err(templates::not_found(&LookupError::SectorNotFound(
                cmd.sector.clone(),
            ))),
        }
    }
}
