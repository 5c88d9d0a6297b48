//! Repository traits — the only persistence surface the bot depends on.
//!
//! `TaskStore` owns task rows; `Directory` resolves workers and sectors.
//! Both backends (`MemoryStore`, `LibSqlStore`) implement both traits.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::DatabaseError;
use crate::tasks::model::{NewTask, Sector, Task, TaskId, TaskStatus, Worker};

/// Backend-agnostic task repository.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a batch of tasks. Either every task is created or none is.
    ///
    /// Returned tasks are in input order, each `Pending`.
    async fn create_tasks(&self, tasks: &[NewTask]) -> Result<Vec<Task>, DatabaseError>;

    /// Get a task by ID.
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, DatabaseError>;

    /// Pending tasks for a worker in creation order, optionally limited to
    /// one execution date.
    async fn find_pending_by_worker(
        &self,
        worker_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Task>, DatabaseError>;

    /// Overwrite status and comment of a task owned by `worker_id`, stamping
    /// `updated_at`.
    ///
    /// Fails with `DatabaseError::NotFound` when no task matches both the id
    /// and the worker. Writes to the same task are linearized.
    async fn update_status(
        &self,
        id: TaskId,
        worker_id: &str,
        status: TaskStatus,
        comment: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<Task, DatabaseError>;
}

/// Worker and sector reference data.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Phone match wins over name match. Names compare case-insensitively.
    async fn find_worker_by_name_or_phone(
        &self,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Worker>, DatabaseError>;

    /// Look up a worker by normalized phone.
    async fn find_worker_by_phone(&self, phone: &str) -> Result<Option<Worker>, DatabaseError>;

    /// Look up a sector by name within one tenant.
    async fn find_sector_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Sector>, DatabaseError>;

    /// Insert or replace a worker.
    async fn upsert_worker(&self, worker: &Worker) -> Result<(), DatabaseError>;

    /// Insert or replace a sector.
    async fn upsert_sector(&self, sector: &Sector) -> Result<(), DatabaseError>;
}

/// A backend that serves both traits.
pub trait Repository: TaskStore + Directory {}

impl<T: TaskStore + Directory> Repository for T {}

/// Case-folded, trimmed form of a worker or sector name for comparisons.
pub(crate) fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Resolve a worker name against candidates.
///
/// An exact full-name match wins; otherwise the name must be a unique
/// leading match on word boundaries ("Juan" matches "Juan Pérez").
pub fn match_worker_name<'a>(workers: impl IntoIterator<Item = &'a Worker>, name: &str) -> Option<&'a Worker> {
    let wanted = fold_name(name);
    if wanted.is_empty() {
        return None;
    }
    let prefix = format!("{wanted} ");

    let mut leading = Vec::new();
    for worker in workers {
        let full = fold_name(&worker.full_name);
        if full == wanted {
            return Some(worker);
        }
        if full.starts_with(&prefix) {
            leading.push(worker);
        }
    }

    match leading.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}
