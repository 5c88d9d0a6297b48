//! Reply wording. Every user-facing string lives here.

use crate::error::LookupError;
use crate::tasks::model::{Sector, Task, TaskStatus, Worker};

/// What happened to the worker-side notice of a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerNotice {
    Sent,
    NoPhone,
    Failed,
}

pub fn pong() -> String {
    "pong".to_string()
}

pub fn admin_usage() -> String {
    [
        "Formato para crear una tarea:",
        "/tarea",
        "sector: <nombre del sector>",
        "fecha: AAAA-MM-DD",
        "peon: <nombre> [teléfono]",
        "desc: <descripción>",
        "coment: <opcional>",
        "tel: <opcional, reemplaza el teléfono>",
    ]
    .join("\n")
}

pub fn admin_missing_fields(fields: &[&str]) -> String {
    format!("Faltan campos: {}.\n\n{}", fields.join(", "), admin_usage())
}

pub fn admin_invalid_date(raw: &str) -> String {
    format!("Fecha inválida: {raw}. Usá el formato AAAA-MM-DD.\n\n{}", admin_usage())
}

pub fn not_found(err: &LookupError) -> String {
    match err {
        LookupError::WorkerNotFound(name) => format!("No encontrado: peón {name}"),
        LookupError::SectorNotFound(name) => format!("No encontrado: sector {name}"),
        LookupError::UnknownSender(_) => not_registered(),
    }
}

pub fn task_created(task: &Task, sector: &Sector, worker: &Worker, notice: WorkerNotice) -> String {
    let mut out = format!(
        "Tarea #{} creada.\nSector: {}\nFecha: {}\nPeón: {}\nDescripción: {}",
        task.id, sector.name, task.date, worker.full_name, task.description
    );
    if let Some(comment) = &task.comment {
        out.push_str(&format!("\nComentario: {comment}"));
    }
    match notice {
        WorkerNotice::Sent => out.push_str("\nSe avisó al peón."),
        WorkerNotice::NoPhone => {
            out.push_str("\nEl peón no tiene teléfono registrado, no se le envió aviso.")
        }
        WorkerNotice::Failed => out.push_str("\nNo se pudo enviar el aviso al peón."),
    }
    out
}

pub fn worker_assignment(task: &Task, sector: &Sector) -> String {
    let mut out = format!(
        "Nueva tarea #{} para el {} (sector {}):\n{}",
        task.id, task.date, sector.name, task.description
    );
    if let Some(comment) = &task.comment {
        out.push_str(&format!("\nComentario: {comment}"));
    }
    out.push_str(&format!(
        "\n\nRespondé 1 cuando la termines o 2 <motivo> si no se pudo. Para esta tarea puntual: #{} 1",
        task.id
    ));
    out
}

pub fn worker_usage() -> String {
    [
        "Para reportar una tarea respondé:",
        "1 = completada",
        "2 <comentario> = no se pudo completar",
        "#<id> 1 o #<id> 2 <comentario> para una tarea puntual",
        "pendientes = ver tus tareas de hoy",
    ]
    .join("\n")
}

pub fn not_registered() -> String {
    "Tu número no está registrado como peón. Consultá con tu encargado.".to_string()
}

pub fn task_not_found(task_id: &str) -> String {
    format!("No se encontró la tarea #{task_id} para vos.")
}

pub fn nothing_pending() -> String {
    "No tenés tareas pendientes para hoy.".to_string()
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "PENDIENTE",
        TaskStatus::Completed => "COMPLETADA",
        TaskStatus::Incomplete => "INCOMPLETA",
    }
}

pub fn status_updated(task: &Task) -> String {
    match task.status {
        TaskStatus::Completed => format!("Tarea #{} marcada como COMPLETADA. ¡Gracias!", task.id),
        status => {
            let mut out = format!("Tarea #{} marcada como {}.", task.id, status_label(status));
            if let Some(comment) = &task.comment {
                out.push_str(&format!("\nComentario: {comment}"));
            }
            out
        }
    }
}

pub fn admin_status_alert(task: &Task, worker: &Worker) -> String {
    let mut out = format!(
        "{} reportó la tarea #{} ({}): {}",
        worker.full_name,
        task.id,
        task.description,
        status_label(task.status)
    );
    if let Some(comment) = &task.comment {
        out.push_str(&format!("\nComentario: {comment}"));
    }
    out
}

pub fn pending_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return nothing_pending();
    }
    let mut out = String::from("Tareas pendientes de hoy:");
    for task in tasks {
        out.push_str(&format!("\n#{} {}", task.id, task.description));
    }
    out
}

pub fn internal_error() -> String {
    "No se pudo procesar el mensaje. Intentá de nuevo en unos minutos.".to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::tasks::model::{NewTask, TaskId};

    fn task(status: TaskStatus, comment: Option<&str>) -> Task {
        let mut task = NewTask {
            tenant_id: "t1".into(),
            sector_id: "s1".into(),
            worker_id: "w1".into(),
            description: "Podar fila 3".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            comment: None,
            created_by_admin_id: "5491100000000".into(),
            created_at: Utc::now(),
        }
        .into_task(TaskId(7));
        task.status = status;
        task.comment = comment.map(str::to_string);
        task
    }

    fn sector() -> Sector {
        Sector {
            id: "s1".into(),
            name: "poda".into(),
            tenant_id: "t1".into(),
            campo_id: "c1".into(),
        }
    }

    fn worker() -> Worker {
        Worker {
            id: "w1".into(),
            tenant_id: "t1".into(),
            full_name: "Juan Pérez".into(),
            phone: None,
        }
    }

    #[test]
    fn confirmation_names_sector_and_date() {
        let msg = task_created(&task(TaskStatus::Pending, None), &sector(), &worker(), WorkerNotice::Sent);
        assert!(msg.contains("poda"));
        assert!(msg.contains("2025-03-01"));
        assert!(msg.contains("#7"));
    }

    #[test]
    fn confirmation_mentions_missing_phone() {
        let msg = task_created(&task(TaskStatus::Pending, None), &sector(), &worker(), WorkerNotice::NoPhone);
        assert!(msg.contains("no tiene teléfono"));
    }

    #[test]
    fn assignment_carries_description() {
        let msg = worker_assignment(&task(TaskStatus::Pending, None), &sector());
        assert!(msg.contains("Podar fila 3"));
        assert!(msg.contains("#7 1"));
    }

    #[test]
    fn status_reply_echoes_comment_only_when_incomplete() {
        let done = status_updated(&task(TaskStatus::Completed, None));
        assert!(done.contains("COMPLETADA"));

        let late = status_updated(&task(TaskStatus::Incomplete, Some("late")));
        assert!(late.contains("INCOMPLETA"));
        assert!(late.contains("late"));
    }

    #[test]
    fn usage_texts_name_the_fields() {
        let msg = admin_missing_fields(&["sector", "desc"]);
        assert!(msg.starts_with("Faltan campos: sector, desc."));
        for field in ["sector:", "fecha:", "peon:", "desc:"] {
            assert!(msg.contains(field), "usage should mention {field}");
        }
        assert!(worker_usage().contains("#<id> 1"));
    }

    #[test]
    fn lookup_failures_name_what_was_missing() {
        assert_eq!(
            not_found(&LookupError::SectorNotFound("riego".into())),
            "No encontrado: sector riego"
        );
        assert!(not_found(&LookupError::WorkerNotFound("Pedro".into())).contains("Pedro"));
        assert_eq!(
            not_found(&LookupError::UnknownSender("5491199999999".into())),
            not_registered()
        );
    }

    #[test]
    fn pending_list_shows_ids() {
        let msg = pending_list(&[task(TaskStatus::Pending, None)]);
        assert!(msg.contains("#7 Podar fila 3"));
        assert_eq!(pending_list(&[]), nothing_pending());
    }
}
