//! Task lifecycle operations on top of a `TaskStore`.
//!
//! Creation always starts at `Pending`; a worker report moves a task to
//! `Completed` or `Incomplete` and later reports overwrite earlier ones.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{DatabaseError, TaskError};
use crate::store::traits::TaskStore;
use crate::tasks::clock::Clock;
use crate::tasks::model::{NewTask, Task, TaskId, TaskStatus};

/// One admin command's worth of tasks: same sector, date and description,
/// one task per worker.
#[derive(Debug, Clone)]
pub struct CreateTasks {
    pub tenant_id: String,
    pub sector_id: String,
    pub worker_ids: Vec<String>,
    pub description: String,
    pub date: NaiveDate,
    pub created_by_admin_id: String,
    pub comment: Option<String>,
}

pub struct TaskService {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current local calendar day.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Create one `Pending` task per worker. All or nothing.
    pub async fn create_tasks_from_admin_command(
        &self,
        request: CreateTasks,
    ) -> Result<Vec<Task>, TaskError> {
        if request.worker_ids.is_empty() {
            return Err(DatabaseError::Constraint("task batch names no workers".into()).into());
        }

        let created_at = self.clock.now();
        let batch: Vec<NewTask> = request
            .worker_ids
            .iter()
            .map(|worker_id| NewTask {
                tenant_id: request.tenant_id.clone(),
                sector_id: request.sector_id.clone(),
                worker_id: worker_id.clone(),
                description: request.description.clone(),
                date: request.date,
                comment: request.comment.clone(),
                created_by_admin_id: request.created_by_admin_id.clone(),
                created_at,
            })
            .collect();

        let tasks = self.store.create_tasks(&batch).await?;
        for task in &tasks {
            info!(
                task_id = %task.id,
                worker_id = %task.worker_id,
                sector_id = %task.sector_id,
                date = %task.date,
                "Task created"
            );
        }
        Ok(tasks)
    }

    /// Record a worker's report on a task.
    ///
    /// With no explicit id, the target is the most recently created task
    /// still pending for the worker today. A task owned by someone else is
    /// reported as not found.
    pub async fn mark_task_status_from_worker(
        &self,
        task_id: Option<TaskId>,
        worker_id: &str,
        status: TaskStatus,
        comment: Option<&str>,
    ) -> Result<Task, TaskError> {
        let current = match task_id {
            Some(id) => self
                .store
                .get_task(id)
                .await?
                .filter(|t| t.worker_id == worker_id)
                .ok_or_else(|| TaskError::not_found(id))?,
            None => self
                .store
                .find_pending_by_worker(worker_id, Some(self.clock.today()))
                .await?
                .pop()
                .ok_or(TaskError::NothingPending)?,
        };

        if !current.status.can_transition_to(status) {
            return Err(TaskError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let updated = self
            .store
            .update_status(current.id, worker_id, status, comment, self.clock.now())
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => TaskError::not_found(current.id),
                other => TaskError::Database(other),
            })?;

        info!(
            task_id = %updated.id,
            worker_id,
            from = %current.status,
            to = %updated.status,
            "Task status updated"
        );
        Ok(updated)
    }

    /// Pending tasks for a worker in creation order.
    pub async fn get_pending_tasks(
        &self,
        worker_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Task>, TaskError> {
        Ok(self.store.find_pending_by_worker(worker_id, date).await?)
    }
}
