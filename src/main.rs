use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use field_dispatch::bot::{Bot, Router};
use field_dispatch::channels::{
    BridgeTransport, CliTransport, ConnectionManager, ReconnectPolicy, SessionSpec, Transport,
};
use field_dispatch::config::{BotConfig, TransportKind};
use field_dispatch::status;
use field_dispatch::store;
use field_dispatch::tasks::{SystemClock, TaskService};

/// Stderr logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "field-dispatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = Arc::new(BotConfig::from_env().context("invalid configuration")?);
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🌱 Field Dispatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Session: {}", config.session_id);
    eprintln!("   Admins: {}", config.admin_phones.len());

    // ── Repository ───────────────────────────────────────────────────────
    let stores = store::open(config.db_path.as_deref(), config.directory_path.as_deref())
        .await
        .context("failed to open storage")?;
    match &config.db_path {
        Some(path) => eprintln!("   Database: {}", path.display()),
        None => eprintln!("   Database: in-memory (tasks are lost on restart)"),
    }

    let task_service = Arc::new(TaskService::new(stores.tasks, Arc::new(SystemClock)));

    // ── Chat session ─────────────────────────────────────────────────────
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Bridge => {
            let url = config
                .bridge_url
                .clone()
                .context("FIELD_DISPATCH_BRIDGE_URL is required for the bridge transport")?;
            eprintln!("   Transport: bridge ({url})");
            Arc::new(BridgeTransport::new(url, config.bridge_token.clone()))
        }
        TransportKind::Cli => {
            let mut admins: Vec<&String> = config.admin_phones.iter().collect();
            admins.sort();
            let local = admins.first().map(|s| s.as_str()).unwrap_or("1000000");
            eprintln!("   Transport: cli (plain lines come from {local})");
            eprintln!("   Prefix a line with '<phone>: ' to speak as someone else.\n");
            Arc::new(CliTransport::new(local))
        }
    };

    let spec = SessionSpec {
        session_id: config.session_id.clone(),
        session_dir: config.session_dir.clone(),
    };
    let policy = ReconnectPolicy::new(config.reconnect_base, config.reconnect_max);
    let (connection, inbound) = ConnectionManager::new(transport, spec, policy);

    if let Err(e) = connection.start().await {
        tracing::error!(error = %e, "Initial chat connection failed; retrying in background");
        connection.schedule_reconnect(&e.to_string());
    }

    // ── Status server ────────────────────────────────────────────────────
    if let Some(port) = config.status_port {
        let app = status::status_routes(Arc::clone(&connection), Arc::clone(&task_service));
        eprintln!("   Status: http://0.0.0.0:{port}/health");
        tokio::spawn(async move {
            if let Err(e) = status::serve(port, app).await {
                tracing::error!(port, error = %e, "Status server failed");
            }
        });
    }

    // ── Bot ──────────────────────────────────────────────────────────────
    let router = Router::new(
        Arc::clone(&config),
        task_service,
        stores.directory,
        connection.clone(),
    );
    let bot = Bot::new(router);
    bot.run(inbound).await;

    connection.shutdown().await;
    Ok(())
}
