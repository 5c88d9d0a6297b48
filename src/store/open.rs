//! Backend selection at boot.

use std::path::Path;
use std::sync::Arc;

use crate::store::libsql_backend::LibSqlStore;
use crate::store::memory::MemoryStore;
use crate::store::seed::DirectorySeed;
use crate::store::traits::{Directory, Repository, TaskStore};

/// Task and directory handles over one shared backend.
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn TaskStore>,
    pub directory: Arc<dyn Directory>,
}

impl Stores {
    pub fn over<R: Repository + 'static>(backend: Arc<R>) -> Self {
        Self {
            tasks: backend.clone(),
            directory: backend,
        }
    }
}

/// Open libSQL at `db_path` (in-memory when `None`), then apply the
/// directory seed at `seed_path` if one is given.
pub async fn open(db_path: Option<&Path>, seed_path: Option<&Path>) -> crate::Result<Stores> {
    let stores = match db_path {
        Some(path) => Stores::over(Arc::new(LibSqlStore::new_local(path).await?)),
        None => Stores::over(Arc::new(MemoryStore::new())),
    };

    if let Some(path) = seed_path {
        DirectorySeed::load(path)?
            .apply(stores.directory.as_ref())
            .await?;
    }
    Ok(stores)
}
