//! room-sync-back binary entrypoint wiring REST, WebSocket, SSE, the room store and the reaper.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use room_sync_back::{
    config::AppConfig,
    dao::room_store::memory::MemoryRoomStore,
    routes,
    services::reaper,
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());
    start_room_store(&app_state).await;
    tokio::spawn(reaper::run(app_state.clone()));

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

/// Use MongoDB when `MONGO_URI` is set, the in-memory store otherwise.
async fn start_room_store(state: &SharedState) {
    if spawn_mongo_supervisor(state) {
        return;
    }

    info!("using in-memory room store");
    state
        .install_room_store(Arc::new(MemoryRoomStore::new()))
        .await;
}

/// Supervise a MongoDB room store in the background; the state stays degraded until it connects.
#[cfg(feature = "mongo-store")]
fn spawn_mongo_supervisor(state: &SharedState) -> bool {
    use room_sync_back::{
        dao::{
            room_store::{
                RoomStore,
                mongodb::{MongoConfig, MongoRoomStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    if env::var_os("MONGO_URI").is_none() {
        return false;
    }

    info!("using MongoDB room store");
    tokio::spawn(storage_supervisor::run(state.clone(), || async {
        let config = MongoConfig::from_env().await?;
        let store = MongoRoomStore::connect(config).await?;
        Ok::<Arc<dyn RoomStore>, StorageError>(Arc::new(store))
    }));
    true
}

#[cfg(not(feature = "mongo-store"))]
fn spawn_mongo_supervisor(_state: &SharedState) -> bool {
    false
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
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
