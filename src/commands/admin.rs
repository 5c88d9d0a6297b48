//! `/tarea` block parser.
//!
//! ```text
//! /tarea
//! sector: poda
//! fecha: 2025-03-01
//! peon: Juan +5491122223333
//! desc: Podar fila 3
//! coment: empezar por el norte
//! ```
//!
//! Keys are case-insensitive and may come in any order. `desc` and `coment`
//! match by prefix (`descripcion`, `comentario`). `tel` overrides a phone
//! embedded in `peon`.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ParseError;
use crate::phone;

/// Header lines that open a task-creation block.
const HEADERS: &[&str] = &["/tarea", "/task"];

/// Required fields in the order they are reported when missing.
pub const REQUIRED_FIELDS: &[&str] = &["sector", "fecha", "peon", "desc"];

/// A validated `/tarea` block. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAdminCommand {
    pub sector: String,
    pub date: NaiveDate,
    /// Worker name as typed, or the phone digits when only a phone was given.
    pub worker_name: String,
    pub worker_phone: Option<String>,
    pub description: String,
    pub comment: Option<String>,
}

/// Parse a `/tarea` block.
///
/// Returns `ParseError::NotACommand` when the first non-empty line is not a
/// header, so callers can ignore free text.
pub fn parse_admin_command(text: &str) -> Result<ParsedAdminCommand, ParseError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match lines.next() {
        Some(header) if is_header(header) => {}
        _ => return Err(ParseError::NotACommand),
    }

    let mut sector = None;
    let mut date = None;
    let mut peon = None;
    let mut tel = None;
    let mut description = None;
    let mut comment = None;

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = match key.as_str() {
            "sector" => &mut sector,
            "fecha" | "date" => &mut date,
            "peon" | "peón" | "worker" => &mut peon,
            k if k.starts_with("desc") => &mut description,
            k if k.starts_with("coment") || k.starts_with("comment") => &mut comment,
            k if k.starts_with("tel") => &mut tel,
            _ => continue,
        };
        *slot = Some(value.to_string());
    }

    let (worker_name, embedded_phone) = match peon.as_deref().map(split_worker) {
        Some((name, phone)) if !name.is_empty() || phone.is_some() => (Some(name), phone),
        _ => (None, None),
    };
    let worker_phone = tel
        .as_deref()
        .map(phone::normalize)
        .filter(|p| !p.is_empty())
        .or(embedded_phone);

    let missing: Vec<&'static str> = [
        sector.is_none(),
        date.is_none(),
        worker_name.is_none(),
        description.is_none(),
    ]
    .into_iter()
    .zip(REQUIRED_FIELDS)
    .filter_map(|(absent, field)| absent.then_some(*field))
    .collect();
    if !missing.is_empty() {
        return Err(ParseError::MissingFields(missing));
    }

    let raw_date = date.unwrap_or_default();
    let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d")
        .map_err(|_| ParseError::InvalidDate(raw_date.clone()))?;

    let worker_name = match worker_name.unwrap_or_default() {
        name if name.is_empty() => worker_phone.clone().unwrap_or_default(),
        name => name,
    };

    Ok(ParsedAdminCommand {
        sector: sector.unwrap_or_default(),
        date,
        worker_name,
        worker_phone,
        description: description.unwrap_or_default(),
        comment,
    })
}

fn is_header(line: &str) -> bool {
    HEADERS.iter().any(|h| line.eq_ignore_ascii_case(h))
}

/// Split `Juan +5491122223333` into name and normalized phone.
fn split_worker(value: &str) -> (String, Option<String>) {
    match phone::extract_phone_token(value) {
        Some((phone, rest)) => (rest, Some(phone)),
        None => (value.to_string(), None),
    }
}
