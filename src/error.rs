//! Error types for field-dispatch.

use crate::tasks::model::TaskStatus;

/// Boot-time failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Database(#[from] DatabaseError),
}

/// Bad or missing environment settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is not set. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("{key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Repository failures, shared by both backends.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("cannot open database: {0}")]
    Pool(String),

    #[error("query: {0}")]
    Query(String),

    #[error("{entity} {id} does not exist")]
    NotFound { entity: String, id: String },

    #[error("rejected write: {0}")]
    Constraint(String),

    #[error("schema migration: {0}")]
    Migration(String),

    #[error("bad stored value: {0}")]
    Serialization(String),
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("{name} transport failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("{name} session dropped: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("send over {name} failed: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("no live chat session")]
    NotConnected,

    #[error("{name} rejected the session: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("bad frame: {0}")]
    Protocol(String),
}

/// Malformed command text. Always answered with a usage reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Free text that does not look like any command.
    #[error("not a command")]
    NotACommand,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Starts like a status reply (`#…` or a number) but matches neither form.
    #[error("malformed status reply")]
    MalformedWorkerReply,
}

/// Unknown worker, sector or sender.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    #[error("sector not found: {0}")]
    SectorNotFound(String),

    #[error("sender {0} is not a registered worker")]
    UnknownSender(String),
}

/// Task lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task does not exist or belongs to another worker. The two cases
    /// are indistinguishable to the caller.
    #[error("task {task_id} not found for this worker")]
    NotFoundOrNotOwned { task_id: String },

    #[error("no pending tasks for today")]
    NothingPending,

    #[error("cannot move task from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("storage: {0}")]
    Database(#[from] DatabaseError),
}

impl TaskError {
    pub fn not_found(task_id: impl ToString) -> Self {
        Self::NotFoundOrNotOwned {
            task_id: task_id.to_string(),
        }
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
