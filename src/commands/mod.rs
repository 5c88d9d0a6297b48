//! Chat command grammar.
//!
//! Pure functions from message text to a typed command. No I/O.

pub mod admin;
pub mod worker;

pub use admin::{ParsedAdminCommand, parse_admin_command};
pub use worker::{ParsedWorkerCommand, WorkerCommand, parse_worker_command};

use crate::error::ParseError;

/// Who sent the message, as decided by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Worker,
}

/// A recognized command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe, answered with `pong` for either role.
    Ping,
    CreateTask(ParsedAdminCommand),
    ReportStatus(ParsedWorkerCommand),
    ListPending,
}

/// `ping`, case-insensitive, nothing else on the line.
pub fn is_ping(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("ping")
}

/// Parse a message for the given role.
pub fn parse(text: &str, role: Role) -> Result<Command, ParseError> {
    if is_ping(text) {
        return Ok(Command::Ping);
    }
    match role {
        Role::Admin => parse_admin_command(text).map(Command::CreateTask),
        Role::Worker => parse_worker_command(text).map(|cmd| match cmd {
            WorkerCommand::Report(report) => Command::ReportStatus(report),
            WorkerCommand::ListPending => Command::ListPending,
        }),
    }
}
