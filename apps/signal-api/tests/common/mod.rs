#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;

use signal_api::config::{Config, DispatchMode, DEFAULT_ROOM_TTL_SECS};
use signal_api::db::{MemoryRoomStore, RoomStore};
use signal_api::gateway::{ConnectionRegistry, LocalDispatcher};
use signal_api::signaling::Dispatcher;
use signal_api::AppState;

pub const CLIENT: &str = "ACME";
pub const SECRET: &str = "acme-test-secret";
pub const STAGE: &str = "dev";

/// Configuration for tests: in-memory store, local dispatch, one known client.
pub fn test_config() -> Config {
    Config {
        port: 0,
        stage: STAGE.to_string(),
        redis_url: None,
        room_ttl_secs: DEFAULT_ROOM_TTL_SECS,
        delete_empty_rooms: false,
        dispatch_mode: DispatchMode::Local,
        management_scheme: "http".to_string(),
        management_api_enabled: false,
        public_domain: None,
        client_secrets: HashMap::from([(CLIENT.to_string(), SECRET.to_string())]),
    }
}

/// Build an AppState around `config` with a fresh in-memory room store and
/// a dispatcher matching `config.dispatch_mode`.
pub fn state_with(config: Config) -> AppState {
    let rooms: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new(Duration::from_secs(
        config.room_ttl_secs,
    )));
    let connections = Arc::new(ConnectionRegistry::new());
    let dispatcher: Arc<dyn Dispatcher> = match config.dispatch_mode {
        DispatchMode::Local => Arc::new(LocalDispatcher::new(connections.clone())),
        DispatchMode::Management => Arc::new(
            signal_api::signaling::ManagementApiDispatcher::new(
                &config.management_scheme,
                &config.stage,
            ),
        ),
    };

    AppState {
        rooms,
        dispatcher,
        connections,
        config: Arc::new(config),
    }
}

pub fn test_state() -> AppState {
    state_with(test_config())
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = signal_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Serve `state` on an ephemeral port. The server runs in the background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = signal_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Mint a chat token for `client` signed with `secret`.
pub fn mint_chat_token(client: &str, secret: &str, expires_at: f64) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &json!({ "client": client, "expiresAt": expires_at }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("mint chat token")
}

/// A token for the test client that is valid for the next ten minutes.
pub fn valid_token() -> String {
    let expires_at = chrono::Utc::now().timestamp() as f64 + 600.0;
    mint_chat_token(CLIENT, SECRET, expires_at)
}
