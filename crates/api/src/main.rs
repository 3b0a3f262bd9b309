use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use campus_core::store::{MemoryStore, Store};
use campus_events::{ActivityPersistence, EmailConfig, EventBus, Notifier};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campus_api::config::ServerConfig;
use campus_api::notifications::NotificationRouter;
use campus_api::router::build_app_router;
use campus_api::state::AppState;

const EXIT_CONFIG: u8 = 1;
const EXIT_STORAGE: u8 = 2;
const DB_MAX_CONNECTIONS: u32 = 20;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campus_api=debug,campus_core=info,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let addr = match config.host.parse() {
        Ok(ip) => SocketAddr::new(ip, config.port),
        Err(e) => {
            tracing::error!(host = %config.host, error = %e, "Invalid HOST address");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let background_cancel = CancellationToken::new();
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    // --- Store ---
    let store: Arc<dyn Store> = if config.uses_memory_store() {
        tracing::warn!("Using the in-process store; data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let pool = match connect(&config.database_url).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "Storage unavailable at startup");
                return ExitCode::from(EXIT_STORAGE);
            }
        };
        // Persist every bus event to the activity log.
        background.push(tokio::spawn(ActivityPersistence::run(
            pool.clone(),
            event_bus.subscribe(),
            background_cancel.clone(),
        )));
        Arc::new(campus_db::PgStore::new(pool))
    };

    // --- Email notifications ---
    match EmailConfig::from_env() {
        Some(email) => match Notifier::start(&email, config.notify.workers, config.notify.queue) {
            Ok((notifier, workers)) => {
                let router = NotificationRouter::new(Arc::clone(&store), notifier);
                background.push(tokio::spawn(router.run(event_bus.subscribe())));
                background.extend(workers);
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid SMTP configuration");
                return ExitCode::from(EXIT_CONFIG);
            }
        },
        None => tracing::info!("SMTP_HOST not set, email notifications disabled"),
    }

    // --- App state and router ---
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let state = AppState::new(store, config.clone(), Arc::clone(&event_bus));
    let app = match build_app_router(state, &config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // --- Start server ---
    tracing::info!(%addr, "Starting server");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining background services");

    // Dropping the last bus handle closes the channel; subscribers then
    // drain and exit, and notifier workers follow once the queue is empty.
    drop(event_bus);
    let drain = drain_all(background);
    if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
        tracing::warn!("Background services did not stop in time, cancelling");
        background_cancel.cancel();
    }

    tracing::info!("Graceful shutdown complete");
    ExitCode::SUCCESS
}

/// Connect, verify and migrate the Postgres database.
async fn connect(database_url: &str) -> Result<campus_db::DbPool, String> {
    let pool = campus_db::create_pool(database_url, DB_MAX_CONNECTIONS)
        .await
        .map_err(|e| format!("connect: {e}"))?;
    tracing::info!("Database connection pool created");

    campus_db::health_check(&pool)
        .await
        .map_err(|e| format!("health check: {e}"))?;
    tracing::info!("Database health check passed");

    campus_db::run_migrations(&pool)
        .await
        .map_err(|e| format!("migrations: {e}"))?;
    tracing::info!("Database migrations applied");
    Ok(pool)
}

async fn drain_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
