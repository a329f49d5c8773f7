use anyhow::{Context, Result};
use chrono::TimeDelta;
use folder_store::{
    config::AppConfig,
    db,
    handlers::AppState,
    routes,
    services::{
        auth::TokenAuthorizer, background::BackgroundTasks, counter_store::SqliteCounterStore,
        file_manager::FileManager, size_ledger::SizeLedger, storage_service::StorageService,
    },
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// How long queued size updates get to finish once the server stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        addr = %cfg.addr(),
        storage_dir = %cfg.storage_dir,
        database_url = %cfg.database_url,
        page_size = cfg.page_size,
        "Starting folder-store"
    );

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize core services ---
    let objects = Arc::new(StorageService::new(db.clone(), cfg.storage_dir.clone()));
    let counters = Arc::new(SqliteCounterStore::new(db.clone()));
    let tasks = BackgroundTasks::new();
    let ledger = SizeLedger::new(counters, objects.clone(), tasks.clone())
        .with_stale_after(TimeDelta::hours(cfg.stale_after_hours))
        .with_page_size(cfg.page_size);
    let files = FileManager::new(objects, ledger).with_page_size(cfg.page_size);

    let authorizer = TokenAuthorizer::new(cfg.admin_token.clone());
    if !authorizer.is_configured() {
        tracing::warn!("No admin token configured; every mutation will be rejected");
    }

    // --- Build router ---
    let state = AppState::new(files, Arc::new(authorizer));
    let app = routes::routes::routes(state, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(pending = tasks.pending(), "Waiting for background tasks");
    tasks.shutdown(SHUTDOWN_GRACE).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
