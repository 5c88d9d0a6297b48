//! libSQL backend — async `TaskStore` + `Directory` implementation.
//!
//! Supports local file and in-memory databases. Task ids come from
//! `INTEGER PRIMARY KEY AUTOINCREMENT`, so id order is creation order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::phone;
use crate::store::migrations;
use crate::store::traits::{Directory, TaskStore, fold_name, match_worker_name};
use crate::tasks::model::{NewTask, Sector, Task, TaskId, TaskStatus, Worker};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Every
/// write holds `write_lock`; batch inserts also run in a transaction, so no
/// other write lands inside an open batch.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("{}: {e}", path.display())))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("connect: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_tasks(
        &self,
        sql: &str,
        values: Vec<libsql::Value>,
        ctx: &str,
    ) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, values)
            .await
            .map_err(|e| DatabaseError::Query(format!("{ctx}: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{ctx} row: {e}")))?
        {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn all_workers(&self) -> Result<Vec<Worker>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY id"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("all_workers: {e}")))?;

        let mut workers = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("all_workers row: {e}")))?
        {
            workers.push(row_to_worker(&row)?);
        }
        Ok(workers)
    }

    async fn query_worker(
        &self,
        sql: &str,
        value: String,
        ctx: &str,
    ) -> Result<Option<Worker>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params![value])
            .await
            .map_err(|e| DatabaseError::Query(format!("{ctx}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_worker(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{ctx} row: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Column list for task SELECT queries (11 columns).
const TASK_COLUMNS: &str = "id, tenant_id, sector_id, worker_id, description, date, status, comment, created_by_admin_id, created_at, updated_at";

const WORKER_COLUMNS: &str = "id, tenant_id, full_name, phone";

const SECTOR_COLUMNS: &str = "id, name, tenant_id, campo_id";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp '{s}': {e}")))
}

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let col = |idx: i32, name: &str| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("task.{name}: {e}")))
    };

    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("task.id: {e}")))?;
    let date_str = col(5, "date")?;
    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
        .map_err(|e| DatabaseError::Serialization(format!("bad date '{date_str}': {e}")))?;
    let status: TaskStatus = col(6, "status")?
        .parse()
        .map_err(DatabaseError::Serialization)?;
    let comment: Option<String> = row.get::<Option<String>>(7).ok().flatten();

    Ok(Task {
        id: TaskId(id),
        tenant_id: col(1, "tenant_id")?,
        sector_id: col(2, "sector_id")?,
        worker_id: col(3, "worker_id")?,
        description: col(4, "description")?,
        date,
        status,
        comment,
        created_by_admin_id: col(8, "created_by_admin_id")?,
        created_at: parse_datetime(&col(9, "created_at")?)?,
        updated_at: parse_datetime(&col(10, "updated_at")?)?,
    })
}

fn row_to_worker(row: &libsql::Row) -> Result<Worker, DatabaseError> {
    let get = |idx: i32, name: &str| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("worker.{name}: {e}")))
    };
    Ok(Worker {
        id: get(0, "id")?,
        tenant_id: get(1, "tenant_id")?,
        full_name: get(2, "full_name")?,
        phone: row.get::<Option<String>>(3).ok().flatten(),
    })
}

fn row_to_sector(row: &libsql::Row) -> Result<Sector, DatabaseError> {
    let get = |idx: i32, name: &str| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("sector.{name}: {e}")))
    };
    Ok(Sector {
        id: get(0, "id")?,
        name: get(1, "name")?,
        tenant_id: get(2, "tenant_id")?,
        campo_id: get(3, "campo_id")?,
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl TaskStore for LibSqlStore {
    async fn create_tasks(&self, tasks: &[NewTask]) -> Result<Vec<Task>, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_tasks begin: {e}")))?;

        let mut created = Vec::with_capacity(tasks.len());
        for new_task in tasks {
            let inserted: Result<Option<i64>, libsql::Error> = async {
                let mut rows = tx
                    .query(
                        "INSERT INTO tasks (tenant_id, sector_id, worker_id, description, date, status, comment, created_by_admin_id, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6, ?7, ?8, ?8)
                         RETURNING id",
                        params![
                            new_task.tenant_id.as_str(),
                            new_task.sector_id.as_str(),
                            new_task.worker_id.as_str(),
                            new_task.description.as_str(),
                            new_task.date.format(DATE_FORMAT).to_string(),
                            new_task.comment.clone(),
                            new_task.created_by_admin_id.as_str(),
                            new_task.created_at.to_rfc3339(),
                        ],
                    )
                    .await?;
                let row = rows.next().await?;
                match row {
                    Some(row) => row.get::<i64>(0).map(Some),
                    None => Ok(None),
                }
            }
            .await;

            match inserted {
                Ok(Some(id)) => created.push(new_task.clone().into_task(TaskId(id))),
                Ok(None) => {
                    let _ = tx.rollback().await;
                    return Err(DatabaseError::Query("create_tasks: insert returned no id".into()));
                }
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(DatabaseError::Query(format!("create_tasks: {e}")));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_tasks commit: {e}")))?;
        debug!(count = created.len(), "Tasks created");
        Ok(created)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, DatabaseError> {
        let mut tasks = self
            .query_tasks(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                vec![libsql::Value::Integer(id.0)],
                "get_task",
            )
            .await?;
        Ok(tasks.pop())
    }

    async fn find_pending_by_worker(
        &self,
        worker_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Task>, DatabaseError> {
        match date {
            Some(date) => {
                self.query_tasks(
                    &format!(
                        "SELECT {TASK_COLUMNS} FROM tasks WHERE worker_id = ?1 AND date = ?2 AND status = 'PENDING' ORDER BY id ASC"
                    ),
                    vec![
                        libsql::Value::Text(worker_id.to_string()),
                        libsql::Value::Text(date.format(DATE_FORMAT).to_string()),
                    ],
                    "find_pending_by_worker",
                )
                .await
            }
            None => {
                self.query_tasks(
                    &format!(
                        "SELECT {TASK_COLUMNS} FROM tasks WHERE worker_id = ?1 AND status = 'PENDING' ORDER BY id ASC"
                    ),
                    vec![libsql::Value::Text(worker_id.to_string())],
                    "find_pending_by_worker",
                )
                .await
            }
        }
    }

    async fn update_status(
        &self,
        id: TaskId,
        worker_id: &str,
        status: TaskStatus,
        comment: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<Task, DatabaseError> {
        if status == TaskStatus::Pending {
            return Err(DatabaseError::Constraint(format!(
                "task {id}: cannot move back to {status}"
            )));
        }

        // Single statement: the owner check and the write are one atomic step.
        let _guard = self.write_lock.lock().await;
        let mut tasks = self
            .query_tasks(
                &format!(
                    "UPDATE tasks SET status = ?1, comment = ?2, updated_at = ?3 WHERE id = ?4 AND worker_id = ?5 RETURNING {TASK_COLUMNS}"
                ),
                vec![
                    libsql::Value::Text(status.as_str().to_string()),
                    match comment {
                        Some(c) => libsql::Value::Text(c.to_string()),
                        None => libsql::Value::Null,
                    },
                    libsql::Value::Text(updated_at.to_rfc3339()),
                    libsql::Value::Integer(id.0),
                    libsql::Value::Text(worker_id.to_string()),
                ],
                "update_status",
            )
            .await?;

        tasks.pop().ok_or_else(|| DatabaseError::NotFound {
            entity: "task".into(),
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl Directory for LibSqlStore {
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
        let workers = self.all_workers().await?;
        Ok(match_worker_name(&workers, name).cloned())
    }

    async fn find_worker_by_phone(&self, phone: &str) -> Result<Option<Worker>, DatabaseError> {
        let wanted = phone::normalize(phone);
        if wanted.is_empty() {
            return Ok(None);
        }
        self.query_worker(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE phone = ?1 LIMIT 1"),
            wanted,
            "find_worker_by_phone",
        )
        .await
    }

    async fn find_sector_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Sector>, DatabaseError> {
        // Folded in Rust: SQLite's NOCASE only folds ASCII.
        let wanted = fold_name(name);
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SECTOR_COLUMNS} FROM sectors WHERE tenant_id = ?1 ORDER BY id"),
                params![tenant_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_sector_by_name: {e}")))?;

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_sector_by_name row: {e}")))?
        {
            let sector = row_to_sector(&row)?;
            if fold_name(&sector.name) == wanted {
                return Ok(Some(sector));
            }
        }
        Ok(None)
    }

    async fn upsert_worker(&self, worker: &Worker) -> Result<(), DatabaseError> {
        let phone = worker
            .phone
            .as_deref()
            .map(phone::normalize)
            .filter(|p| !p.is_empty());
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO workers (id, tenant_id, full_name, phone) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET tenant_id = excluded.tenant_id, full_name = excluded.full_name, phone = excluded.phone",
                params![
                    worker.id.as_str(),
                    worker.tenant_id.as_str(),
                    worker.full_name.as_str(),
                    phone,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_worker: {e}")))?;
        Ok(())
    }

    async fn upsert_sector(&self, sector: &Sector) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO sectors (id, name, tenant_id, campo_id) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, tenant_id = excluded.tenant_id, campo_id = excluded.campo_id",
                params![
                    sector.id.as_str(),
                    sector.name.as_str(),
                    sector.tenant_id.as_str(),
                    sector.campo_id.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_sector: {e}")))?;
        Ok(())
    }
}
