//! Directory seeding from a JSON file.
//!
//! ```json
//! {
//!   "workers": [{"id": "w1", "tenant_id": "t1", "full_name": "Juan Pérez", "phone": "+54 9 11 2222-3333"}],
//!   "sectors": [{"id": "s1", "name": "poda", "tenant_id": "t1", "campo_id": "c1"}]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DatabaseError};
use crate::store::traits::Directory;
use crate::tasks::model::{Sector, Worker};

/// Worker and sector reference data to load at boot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub sectors: Vec<Sector>,
}

impl DirectorySeed {
    /// Read a seed file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Upsert every entry. Phones are normalized by the directory.
    pub async fn apply(&self, directory: &dyn Directory) -> Result<(), DatabaseError> {
        for worker in &self.workers {
            directory.upsert_worker(worker).await?;
        }
        for sector in &self.sectors {
            directory.upsert_sector(sector).await?;
        }
        tracing::info!(
            workers = self.workers.len(),
            sectors = self.sectors.len(),
            "Directory seeded"
        );
        Ok(())
    }
}
