use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use trip_dispatch::api;
use trip_dispatch::config::{Config, LogFormat, StoreBackend};
use trip_dispatch::engine::archive::{DisabledArchive, HttpTripArchive, TripArchive};
use trip_dispatch::engine::coordinator::CoordinatorOptions;
use trip_dispatch::error::AppError;
use trip_dispatch::state::AppState;
use trip_dispatch::store::{DispatchStore, MemoryStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let store: Arc<dyn DispatchStore> = match &config.store {
        StoreBackend::Sqlite(path) => {
            tracing::info!(path = %path.display(), "opening sqlite store");
            Arc::new(SqliteStore::open(path)?)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let archive: Arc<dyn TripArchive> = match &config.archive_url {
        Some(url) => {
            let archive = HttpTripArchive::new(url, config.archive_timeout)?;
            tracing::info!(endpoint = archive.endpoint(), "trip archive configured");
            Arc::new(archive)
        }
        None => {
            tracing::warn!("ARCHIVE_URL is empty; completed trips will not be archived");
            Arc::new(DisabledArchive)
        }
    };

    let options = CoordinatorOptions {
        archive_timeout: config.archive_timeout,
        event_buffer_size: config.event_buffer_size,
    };
    let shared_state = Arc::new(AppState::new(store, archive, options));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
