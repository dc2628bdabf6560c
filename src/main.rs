//! Baby Foot Back binary entrypoint wiring REST, SSE and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use baby_foot_back::{
    config::AppConfig,
    dao::match_store::{MatchStore, memory::MemoryMatchStore},
    routes,
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    start_storage(&app_state).await?;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the backend selected by `STORAGE_BACKEND` (`memory`, `mongo` or `couch`).
///
/// Remote backends are connected by the storage supervisor in the background;
/// the server runs in degraded mode until the first connection succeeds.
async fn start_storage(state: &SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".into());
    info!(backend = %backend, "selecting storage backend");

    match backend.as_str() {
        "memory" => {
            let store: Arc<dyn MatchStore> = Arc::new(MemoryMatchStore::new());
            state.install_match_store(store).await;
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use baby_foot_back::{
                dao::{
                    match_store::mongodb::{MongoConfig, MongoMatchStore},
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            let config = MongoConfig::from_env()
                .await
                .context("reading MongoDB configuration")?;
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let config = config.clone();
                async move {
                    let store = MongoMatchStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
                }
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use baby_foot_back::{
                dao::{
                    match_store::couchdb::{CouchConfig, CouchMatchStore},
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            let config = CouchConfig::from_env().context("reading CouchDB configuration")?;
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let config = config.clone();
                async move {
                    let store = CouchMatchStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
                }
            }));
        }
        other => anyhow::bail!("unsupported STORAGE_BACKEND `{other}`"),
    }

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
