pub mod connections;
pub mod health;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(connections::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Connection management
        connections::post_to_connection,
        connections::get_connection,
        connections::delete_connection,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Models
            crate::models::Participant,
            crate::gateway::ConnectionInfo,
            // Signaling frames and events
            crate::signaling::JoinRoomRequest,
            crate::signaling::SendPayloadRequest,
            crate::signaling::SignalEvent,
            crate::signaling::RelayResponse,
            health::HealthResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Connections", description = "Connection management"),
    )
)]
pub struct ApiDoc;
