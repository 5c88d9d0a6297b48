//! Notification dispatcher — outbound replies and alerts.
//!
//! Sends are best-effort. A failed send is logged and reported to the
//! caller as `false`; it never undoes a task change.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bot::templates::{self, WorkerNotice};
use crate::channels::connection::Outbound;
use crate::phone;
use crate::tasks::model::{Sector, Task, Worker};

pub struct NotificationDispatcher {
    outbound: Arc<dyn Outbound>,
}

impl NotificationDispatcher {
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self { outbound }
    }

    /// Send `body` to a chat address. Returns whether the send succeeded.
    pub async fn send(&self, to: &str, body: &str) -> bool {
        match self.outbound.send_text(to, body).await {
            Ok(()) => {
                debug!(to, "Message sent");
                true
            }
            Err(e) => {
                warn!(to, error = %e, "Failed to deliver message");
                false
            }
        }
    }

    /// Tell a worker about a newly assigned task.
    pub async fn notify_worker(&self, worker: &Worker, task: &Task, sector: &Sector) -> WorkerNotice {
        let Some(worker_phone) = worker.phone.as_deref().filter(|p| !p.is_empty()) else {
            return WorkerNotice::NoPhone;
        };
        let body = templates::worker_assignment(task, sector);
        if self.send(&phone::chat_address(worker_phone), &body).await {
            WorkerNotice::Sent
        } else {
            WorkerNotice::Failed
        }
    }

    /// Tell the admin who created a task that its worker reported on it.
    pub async fn alert_admin(&self, task: &Task, worker: &Worker) -> bool {
        let to = phone::chat_address(&task.created_by_admin_id);
        self.send(&to, &templates::admin_status_alert(task, worker)).await
    }
}
