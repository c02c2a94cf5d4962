//! Connection management API: lets another process push frames to, inspect,
//! or drop a connection held by this server. Mounted only when enabled.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::ApiError;
use crate::gateway::ConnectionInfo;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{stage}/@connections/{connection_id}",
        post(post_to_connection)
            .get(get_connection)
            .delete(delete_connection),
    )
}

fn check_stage(state: &AppState, stage: &str) -> Result<(), ApiError> {
    if !state.config.management_api_enabled || stage != state.config.stage {
        return Err(ApiError::not_found("Not found"));
    }
    Ok(())
}

fn gone() -> ApiError {
    ApiError::gone("Connection is gone")
}

#[utoipa::path(
    post,
    path = "/{stage}/@connections/{connection_id}",
    tag = "Connections",
    params(
        ("stage" = String, Path, description = "Deployment stage"),
        ("connection_id" = String, Path, description = "Connection ID"),
    ),
    request_body(content = String, description = "Frame sent verbatim to the connection"),
    responses(
        (status = 200, description = "Frame queued"),
        (status = 404, description = "Unknown stage or API disabled", body = crate::error::ApiErrorBody),
        (status = 410, description = "Connection is gone", body = crate::error::ApiErrorBody),
    )
)]
pub async fn post_to_connection(
    State(state): State<AppState>,
    Path((stage, connection_id)): Path<(String, String)>,
    body: String,
) -> Result<StatusCode, ApiError> {
    check_stage(&state, &stage)?;
    state
        .connections
        .deliver(&connection_id, body)
        .map_err(|_| gone())?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/{stage}/@connections/{connection_id}",
    tag = "Connections",
    params(
        ("stage" = String, Path, description = "Deployment stage"),
        ("connection_id" = String, Path, description = "Connection ID"),
    ),
    responses(
        (status = 200, description = "Connection details", body = ConnectionInfo),
        (status = 404, description = "Unknown stage or API disabled", body = crate::error::ApiErrorBody),
        (status = 410, description = "Connection is gone", body = crate::error::ApiErrorBody),
    )
)]
pub async fn get_connection(
    State(state): State<AppState>,
    Path((stage, connection_id)): Path<(String, String)>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    check_stage(&state, &stage)?;
    state
        .connections
        .info(&connection_id)
        .map(Json)
        .ok_or_else(gone)
}

#[utoipa::path(
    delete,
    path = "/{stage}/@connections/{connection_id}",
    tag = "Connections",
    params(
        ("stage" = String, Path, description = "Deployment stage"),
        ("connection_id" = String, Path, description = "Connection ID"),
    ),
    responses(
        (status = 204, description = "Connection closed"),
        (status = 404, description = "Unknown stage or API disabled", body = crate::error::ApiErrorBody),
        (status = 410, description = "Connection is gone", body = crate::error::ApiErrorBody),
    )
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    Path((stage, connection_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    check_stage(&state, &stage)?;
    if !state.connections.close(&connection_id) {
        return Err(gone());
    }
    tracing::info!(%connection_id, "connection closed via management API");
    Ok(StatusCode::NO_CONTENT)
}
