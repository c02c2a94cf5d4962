pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod signaling;

use std::sync::Arc;

use config::Config;
use db::RoomStore;
use gateway::ConnectionRegistry;
use signaling::Dispatcher;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<dyn RoomStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub connections: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
}
