//! In-memory repository — indexed maps behind a single `RwLock`.
//!
//! Primary index: `BTreeMap<TaskId, Task>` (ids grow monotonically, so map
//! order is creation order). Secondary index: `(worker_id, date) -> [TaskId]`
//! in creation order, which serves the pending-for-today lookup directly.
//! Every write takes the write lock, so updates to one task are linearized.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::DatabaseError;
use crate::phone;
use crate::store::traits::{Directory, TaskStore, fold_name, match_worker_name};
use crate::tasks::model::{NewTask, Sector, Task, TaskId, TaskStatus, Worker};

#[derive(Default)]
struct Inner {
    next_id: i64,
    tasks: BTreeMap<TaskId, Task>,
    by_worker_date: HashMap<(String, NaiveDate), Vec<TaskId>>,
    workers: BTreeMap<String, Worker>,
    sectors: BTreeMap<String, Sector>,
}

/// Process-local repository. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_tasks(&self, tasks: &[NewTask]) -> Result<Vec<Task>, DatabaseError> {
        let mut inner = self.inner.write().await;

        // Validate the whole batch before touching the maps.
        if let Some(bad) = tasks.iter().find(|t| t.worker_id.is_empty()) {
            return Err(DatabaseError::Constraint(format!(
                "task '{}' has no worker",
                bad.description
            )));
        }

        let mut created = Vec::with_capacity(tasks.len());
        for new_task in tasks {
            inner.next_id += 1;
            let id = TaskId(inner.next_id);
            let task = new_task.clone().into_task(id);
            inner
                .by_worker_date
                .entry((task.worker_id.clone(), task.date))
                .or_default()
                .push(id);
            inner.tasks.insert(id, task.clone());
            debug!(task_id = %id, worker_id = %task.worker_id, "Task created");
            created.push(task);
        }
        Ok(created)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, DatabaseError> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn find_pending_by_worker(
        &self,
        worker_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Task>, DatabaseError> {
        let inner = self.inner.read().await;

        let pending = match date {
            Some(date) => inner
                .by_worker_date
                .get(&(worker_id.to_string(), date))
                .into_iter()
                .flatten()
                .filter_map(|id| inner.tasks.get(id))
                .filter(|t| t.status == TaskStatus::Pending)
                .cloned()
                .collect(),
            None => inner
                .tasks
                .values()
                .filter(|t| t.worker_id == worker_id && t.status == TaskStatus::Pending)
                .cloned()
                .collect(),
        };
        Ok(pending)
    }

    async fn update_status(
        &self,
        id: TaskId,
        worker_id: &str,
        status: TaskStatus,
        comment: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<Task, DatabaseError> {
        let mut inner = self.inner.write().await;

        let task = inner
            .tasks
            .get_mut(&id)
            .filter(|t| t.worker_id == worker_id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "task".into(),
                id: id.to_string(),
            })?;

        if !task.status.can_transition_to(status) {
            return Err(DatabaseError::Constraint(format!(
                "task {id}: {} -> {status}",
                task.status
            )));
        }

        task.status = status;
        task.comment = comment.map(str::to_string);
        task.updated_at = updated_at;
        Ok(task.clone())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn find_worker_by_name_or_phone(
        &self,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Worker>, DatabaseError> {
        if let Some(phone) = phone {
            if let Some(worker) = self.find_worker_by_phone(phone).await? {
                return Ok(Some(worker));
            }
        }
        let Some(name) = name else {
            return Ok(None);
        };
        let inner = self.inner.read().await;
        Ok(match_worker_name(inner.workers.values(), name).cloned())
    }

    async fn find_worker_by_phone(&self, phone: &str) -> Result<Option<Worker>, DatabaseError> {
        let wanted = phone::normalize(phone);
        if wanted.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.read().await;
        Ok(inner
            .workers
            .values()
            .find(|w| w.phone.as_deref() == Some(wanted.as_str()))
            .cloned())
    }

    async fn find_sector_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Sector>, DatabaseError> {
        let wanted = fold_name(name);
        let inner = self.inner.read().await;
        Ok(inner
            .sectors
            .values()
            .find(|s| s.tenant_id == tenant_id && fold_name(&s.name) == wanted)
            .cloned())
    }

    async fn upsert_worker(&self, worker: &Worker) -> Result<(), DatabaseError> {
        let mut worker = worker.clone();
        worker.phone = worker
            .phone
            .as_deref()
            .map(phone::normalize)
            .filter(|p| !p.is_empty());
        self.inner
            .write()
            .await
            .workers
            .insert(worker.id.clone(), worker);
        Ok(())
    }

    async fn upsert_sector(&self, sector: &Sector) -> Result<(), DatabaseError> {
        self.inner
            .write()
            .await
            .sectors
            .insert(sector.id.clone(), sector.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn new_task(worker: &str, desc: &str, date: NaiveDate) -> NewTask {
        NewTask {
            tenant_id: "t1".into(),
            sector_id: "s1".into(),
            worker_id: worker.into(),
            description: desc.into(),
            date,
            comment: None,
            created_by_admin_id: "5491100000000".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let created = store
            .create_tasks(&[new_task("w1", "A", day(1)), new_task("w2", "B", day(1))])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created[0].id < created[1].id);
        assert!(created.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[tokio::test]
    async fn invalid_batch_creates_nothing() {
        let store = MemoryStore::new();
        let err = store
            .create_tasks(&[new_task("w1", "A", day(1)), new_task("", "B", day(1))])
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
        assert!(store.find_pending_by_worker("w1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_lookup_filters_by_date_and_keeps_order() {
        let store = MemoryStore::new();
        store
            .create_tasks(&[
                new_task("w1", "A", day(1)),
                new_task("w1", "other day", day(2)),
                new_task("w1", "B", day(1)),
                new_task("w2", "not mine", day(1)),
                new_task("w1", "C", day(1)),
            ])
            .await
            .unwrap();

        let today: Vec<_> = store
            .find_pending_by_worker("w1", Some(day(1)))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.description)
            .collect();
        assert_eq!(today, ["A", "B", "C"]);

        let all = store.find_pending_by_worker("w1", None).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn reported_tasks_leave_pending_list() {
        let store = MemoryStore::new();
        let created = store.create_tasks(&[new_task("w1", "A", day(1))]).await.unwrap();
        store
            .update_status(created[0].id, "w1", TaskStatus::Completed, None, Utc::now())
            .await
            .unwrap();
        assert!(store
            .find_pending_by_worker("w1", Some(day(1)))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_requires_owner() {
        let store = MemoryStore::new();
        let created = store.create_tasks(&[new_task("w1", "A", day(1))]).await.unwrap();
        let err = store
            .update_status(created[0].id, "w2", TaskStatus::Completed, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));

        let unchanged = store.get_task(created[0].id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = MemoryStore::new();
        let id = store.create_tasks(&[new_task("w1", "A", day(1))]).await.unwrap()[0].id;

        store.update_status(id, "w1", TaskStatus::Completed, None, Utc::now()).await.unwrap();
        let task = store
            .update_status(id, "w1", TaskStatus::Incomplete, Some("late"), Utc::now())
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Incomplete);
        assert_eq!(task.comment.as_deref(), Some("late"));

        let task = store.update_status(id, "w1", TaskStatus::Completed, None, Utc::now()).await.unwrap();
        assert!(task.comment.is_none());
    }

    #[tokio::test]
    async fn concurrent_updates_are_linearized() {
        let store = Arc::new(MemoryStore::new());
        let id = store.create_tasks(&[new_task("w1", "A", day(1))]).await.unwrap()[0].id;

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let comment = format!("try {i}");
                store
                    .update_status(id, "w1", TaskStatus::Incomplete, Some(&comment), Utc::now())
                    .await
                    .unwrap()
            }));
        }
        let mut last_seen = None;
        for h in handles {
            let task = h.await.unwrap();
            assert_eq!(task.status, TaskStatus::Incomplete);
            last_seen = Some(task.updated_at);
        }
        assert!(last_seen.is_some());

        let final_task = store.get_task(id).await.unwrap().unwrap();
        assert!(final_task.comment.unwrap().starts_with("try "));
    }

    #[tokio::test]
    async fn directory_lookups() {
        let store = MemoryStore::new();
        store
            .upsert_worker(&Worker {
                id: "w1".into(),
                tenant_id: "t1".into(),
                full_name: "Juan Pérez".into(),
                phone: Some("+54 9 11 2222-3333".into()),
            })
            .await
            .unwrap();
        store
            .upsert_sector(&Sector {
                id: "s1".into(),
                name: "Poda".into(),
                tenant_id: "t1".into(),
                campo_id: "c1".into(),
            })
            .await
            .unwrap();

        let by_phone = store.find_worker_by_phone("5491122223333@c.us").await.unwrap();
        assert_eq!(by_phone.unwrap().id, "w1");

        let by_name = store
            .find_worker_by_name_or_phone(Some("juan"), Some("000000000"))
            .await
            .unwrap();
        assert_eq!(by_name.unwrap().id, "w1");

        assert!(store.find_sector_by_name("t1", "poda").await.unwrap().is_some());
        assert!(store.find_sector_by_name("t2", "poda").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sector_lookup_folds_non_ascii_case() {
        let store = MemoryStore::new();
        store
            .upsert_sector(&Sector {
                id: "s1".into(),
                name: "Ñandú Norte".into(),
                tenant_id: "t1".into(),
                campo_id: "c1".into(),
            })
            .await
            .unwrap();

        let found = store.find_sector_by_name("t1", " ñandú norte ").await.unwrap();
        assert_eq!(found.unwrap().id, "s1");
        assert!(store.find_sector_by_name("t1", "nandu norte").await.unwrap().is_none());
    }
}
