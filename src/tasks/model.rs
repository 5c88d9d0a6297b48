//! Task data model — tasks, statuses, and directory reference data.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned task identifier. Small integers so workers can type `#12 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(TaskId)
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, waiting for the worker's report.
    Pending,
    /// Worker confirmed completion.
    Completed,
    /// Worker reported the task could not be finished.
    Incomplete,
}

impl TaskStatus {
    /// Check if this state allows transitioning to another state.
    ///
    /// Both reported states can be overwritten by a later report.
    /// Nothing moves back to `Pending`.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Completed)
                | (Pending, Incomplete)
                | (Completed, Completed)
                | (Completed, Incomplete)
                | (Incomplete, Incomplete)
                | (Incomplete, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Incomplete => "INCOMPLETE",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "INCOMPLETE" => Ok(Self::Incomplete),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A unit of field work assigned to one worker for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: String,
    pub sector_id: String,
    pub worker_id: String,
    pub description: String,
    /// Execution date. Never changes after creation.
    pub date: NaiveDate,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_by_admin_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub tenant_id: String,
    pub sector_id: String,
    pub worker_id: String,
    pub description: String,
    pub date: NaiveDate,
    pub comment: Option<String>,
    pub created_by_admin_id: String,
    pub created_at: DateTime<Utc>,
}

impl NewTask {
    /// Materialize with a store-assigned id. Always starts `Pending`.
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            tenant_id: self.tenant_id,
            sector_id: self.sector_id,
            worker_id: self.worker_id,
            description: self.description,
            date: self.date,
            status: TaskStatus::Pending,
            comment: self.comment,
            created_by_admin_id: self.created_by_admin_id,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// A field worker. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub tenant_id: String,
    pub full_name: String,
    /// Digits-only phone, when the worker has one on file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A named subdivision of a tenant's field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub campo_id: String,
}
