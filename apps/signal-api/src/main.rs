use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signal_api::config::{Config, DispatchMode};
use signal_api::db::{MemoryRoomStore, RedisRoomStore, RoomStore};
use signal_api::gateway::{ConnectionRegistry, LocalDispatcher};
use signal_api::signaling::{Dispatcher, ManagementApiDispatcher};
use signal_api::AppState;

/// How often the in-memory store sweeps expired rooms.
const PURGE_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let ttl = Duration::from_secs(config.room_ttl_secs);

    let rooms: Arc<dyn RoomStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisRoomStore::connect(url, ttl)
                .await
                .expect("failed to connect to Redis");
            tracing::info!("using Redis room store");
            Arc::new(store)
        }
        None => {
            let store = Arc::new(MemoryRoomStore::new(ttl));
            spawn_purge_task(store.clone());
            tracing::info!("using in-memory room store");
            store
        }
    };

    let connections = Arc::new(ConnectionRegistry::new());
    let dispatcher: Arc<dyn Dispatcher> = match config.dispatch_mode {
        DispatchMode::Local => Arc::new(LocalDispatcher::new(connections.clone())),
        DispatchMode::Management => Arc::new(ManagementApiDispatcher::new(
            &config.management_scheme,
            &config.stage,
        )),
    };

    tracing::info!(
        stage = %config.stage,
        dispatch_mode = ?config.dispatch_mode,
        management_api = config.management_api_enabled,
        clients = config.client_secrets.len(),
        "signal-api configured"
    );

    let state = AppState {
        rooms,
        dispatcher,
        connections,
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(signal_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "signal-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn spawn_purge_task(store: Arc<MemoryRoomStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = store.room_count(), "expired rooms purged");
            }
        }
    });
}
