//! Worker reply parser.
//!
//! Accepted status replies:
//! - `1` / `2 <comment>` — report on today's most recent pending task
//! - `#<id> 1` / `#<id> 2 <comment>` — report on a specific task
//!
//! Code `1` is `Completed` and carries no comment. Code `2` is `Incomplete`
//! and keeps the trailing text as the comment.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;
use crate::tasks::model::TaskStatus;

static EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^#?(\S+)\s+(1|2)\b\s*(.*)$").expect("valid explicit reply regex")
});

static IMPLICIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(1|2)\b\s*(.*)$").expect("valid implicit reply regex"));

/// A worker's status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedWorkerCommand {
    /// Raw task reference without the leading `#`. `None` means "today's
    /// latest pending task".
    pub task_id: Option<String>,
    pub status: TaskStatus,
    pub comment: Option<String>,
}

/// Anything a worker can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Report(ParsedWorkerCommand),
    /// `pendientes` / `tareas`: list today's pending tasks.
    ListPending,
}

/// Parse a worker message.
///
/// Text that does not look like a reply at all yields `NotACommand`. Text
/// that starts like one (`#…` or a number) but fits neither form yields
/// `MalformedWorkerReply`.
pub fn parse_worker_command(text: &str) -> Result<WorkerCommand, ParseError> {
    let trimmed = text.trim();

    if ["pendientes", "tareas", "/pendientes"]
        .iter()
        .any(|k| trimmed.eq_ignore_ascii_case(k))
    {
        return Ok(WorkerCommand::ListPending);
    }

    let report = if trimmed.starts_with('#') {
        parse_explicit(trimmed)
    } else {
        parse_implicit(trimmed).or_else(|| parse_explicit(trimmed))
    };

    match report {
        Some(report) => Ok(WorkerCommand::Report(report)),
        None if has_reply_prefix(trimmed) => Err(ParseError::MalformedWorkerReply),
        None => Err(ParseError::NotACommand),
    }
}

fn parse_explicit(text: &str) -> Option<ParsedWorkerCommand> {
    let caps = EXPLICIT.captures(text)?;
    let task_id = caps.get(1)?.as_str().trim_start_matches('#').to_string();
    if task_id.is_empty() {
        return None;
    }
    Some(build(Some(task_id), caps.get(2)?.as_str(), caps.get(3).map(|m| m.as_str())))
}

fn parse_implicit(text: &str) -> Option<ParsedWorkerCommand> {
    let caps = IMPLICIT.captures(text)?;
    Some(build(None, caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str())))
}

fn build(task_id: Option<String>, code: &str, trailing: Option<&str>) -> ParsedWorkerCommand {
    if code == "1" {
        return ParsedWorkerCommand {
            task_id,
            status: TaskStatus::Completed,
            comment: None,
        };
    }
    ParsedWorkerCommand {
        task_id,
        status: TaskStatus::Incomplete,
        comment: trailing
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
    }
}

fn has_reply_prefix(text: &str) -> bool {
    if text.starts_with('#') {
        return true;
    }
    text.split_whitespace()
        .next()
        .is_some_and(|first| first.chars().all(|c| c.is_ascii_digit()))
}
