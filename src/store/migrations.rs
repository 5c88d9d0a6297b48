//! Schema migrations for the libSQL backend.
//!
//! Applied versions are recorded in `_migrations`. Each pending step runs in
//! its own transaction together with its bookkeeping row, so a crash leaves
//! the schema at a whole version.

use libsql::Connection;
use tracing::info;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "directory",
        sql: r#"
            CREATE TABLE IF NOT EXISTS workers (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                full_name TEXT NOT NULL,
                phone TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_workers_phone ON workers(phone);
            CREATE INDEX IF NOT EXISTS idx_workers_name ON workers(full_name COLLATE NOCASE);

            CREATE TABLE IF NOT EXISTS sectors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                campo_id TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sectors_tenant_name
                ON sectors(tenant_id, name COLLATE NOCASE);
        "#,
    },
    Migration {
        version: 2,
        name: "tasks",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                sector_id TEXT NOT NULL,
                worker_id TEXT NOT NULL,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                comment TEXT,
                created_by_admin_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_worker_date_status
                ON tasks(worker_id, date, status);
        "#,
    },
];

/// Bring the schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("bookkeeping table: {e}")))?;

    let applied = applied_version(conn).await?;
    let pending = MIGRATIONS.iter().filter(|m| m.version > applied);

    let mut latest = applied;
    for step in pending {
        info!(version = step.version, name = step.name, "Migrating schema");
        let batch = format!(
            "BEGIN;\n{}\nINSERT INTO _migrations (version, name) VALUES ({}, '{}');\nCOMMIT;",
            step.sql, step.version, step.name
        );
        if let Err(e) = conn.execute_batch(&batch).await {
            let _ = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::Migration(format!(
                "V{} {}: {e}",
                step.version, step.name
            )));
        }
        latest = step.version;
    }

    if latest != applied {
        info!(from = applied, to = latest, "Schema up to date");
    }
    Ok(())
}

/// Highest recorded version; 0 on a fresh database.
async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading version: {e}")))?;

    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("version column: {e}")))
}
