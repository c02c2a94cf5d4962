//! Connect-time authorization extractor.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::token::{self, Decision};
use crate::AppState;

/// A client whose `?client=<ns>&token=<jwt>` passed the gate.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    pub client: String,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    client: Option<String>,
    token: Option<String>,
}

/// Rejection returned for any denied connection. Carries no reason.
pub struct AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "FORBIDDEN",
                "message": "Forbidden"
            }
        });
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthorizedClient {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let params = Query::<ConnectParams>::try_from_uri(&parts.uri)
            .map(|Query(params)| params)
            .unwrap_or_default();

        let client = params.client.filter(|c| !c.is_empty()).ok_or(AuthError)?;

        match token::authorize(&state.config, &client, params.token.as_deref()) {
            Decision::Allow => Ok(AuthorizedClient { client }),
            Decision::Deny => Err(AuthError),
        }
    }
}
