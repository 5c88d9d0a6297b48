//! HTTP status surface — health and a read-only view of pending tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::channels::connection::ConnectionManager;
use crate::tasks::service::TaskService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub connection: Arc<ConnectionManager>,
    pub tasks: Arc<TaskService>,
}

/// Build the Axum router with the status routes.
pub fn status_routes(connection: Arc<ConnectionManager>, tasks: Arc<TaskService>) -> Router {
    let state = AppState { connection, tasks };

    Router::new()
        .route("/health", get(health))
        .route("/api/workers/{id}/tasks/pending", get(pending_tasks))
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until the process exits.
pub async fn serve(port: u16, app: Router) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Status server listening");
    axum::serve(listener, app).await
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connection": state.connection.state(),
        "reconnect_attempt": state.connection.reconnect_attempt(),
        "session_id": state.connection.session_id(),
        "transport": state.connection.transport_name(),
    }))
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
    date: Option<String>,
}

async fn pending_tasks(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Query(query): Query<PendingQuery>,
) -> impl IntoResponse {
    let date = match query.date.as_deref().map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d")) {
        None => None,
        Some(Ok(date)) => Some(date),
        Some(Err(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "date must be YYYY-MM-DD"})),
            );
        }
    };

    match state.tasks.get_pending_tasks(&worker_id, date).await {
        Ok(tasks) => (StatusCode::OK, Json(serde_json::json!(tasks))),
        Err(e) => {
            error!(worker_id, error = %e, "Pending task query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "query failed"})),
            )
        }
    }
}
