//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::middleware::AuthorizedClient;
use crate::signaling::{
    join_room, send_payload, JoinOptions, JoinRoomRequest, RequestContext, SendPayloadRequest,
};
use crate::AppState;

/// Client frame actions.
pub const ACTION_JOIN_ROOM: &str = "join-room";
pub const ACTION_SEND_PAYLOAD: &str = "send-payload";

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    auth: AuthorizedClient,
    headers: HeaderMap,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let domain = state
        .config
        .public_domain
        .clone()
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());

    ws.on_upgrade(move |socket| handle_connection(socket, state, auth.client, domain))
}

async fn handle_connection(socket: WebSocket, state: AppState, client: String, domain: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut outbound) = mpsc::unbounded_channel::<Message>();

    let connection_id = state.connections.register(&client, tx);
    let ctx = RequestContext {
        connection_id,
        domain_name: domain,
    };

    tracing::info!(
        connection_id = %ctx.connection_id,
        %client,
        domain = %ctx.domain_name,
        "connection established"
    );

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_frame(&state, &ctx, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %ctx.connection_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            // Events queued for this connection by dispatchers or the management API.
            out = outbound.recv() => {
                let Some(msg) = out else { break };
                let closing = matches!(msg, Message::Close(_));
                if ws_tx.send(msg).await.is_err() || closing {
                    break;
                }
            }
        }
    }

    state.connections.unregister(&ctx.connection_id);

    tracing::info!(connection_id = %ctx.connection_id, %client, "connection closed");
}

/// Route one `{ "action": ..., ...body }` frame. Nothing is written back to the
/// sender here: replies travel as dispatched events.
async fn handle_frame(state: &AppState, ctx: &RequestContext, text: &str) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(connection_id = %ctx.connection_id, %e, "ignoring non-JSON frame");
            return;
        }
    };

    let action = frame
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match action.as_str() {
        ACTION_JOIN_ROOM => {
            let request: JoinRoomRequest = match serde_json::from_value(frame) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(connection_id = %ctx.connection_id, %e, "invalid join-room body");
                    return;
                }
            };
            let options = JoinOptions {
                delete_empty_rooms: state.config.delete_empty_rooms,
            };
            match join_room(
                state.rooms.as_ref(),
                state.dispatcher.as_ref(),
                ctx,
                request,
                options,
            )
            .await
            {
                Ok(outcome) => tracing::debug!(
                    connection_id = %ctx.connection_id,
                    notified = outcome.clients_notified,
                    dead = outcome.dead_positions.len(),
                    first_to_join = outcome.first_to_join,
                    "join-room handled"
                ),
                Err(err) => tracing::warn!(
                    connection_id = %ctx.connection_id,
                    code = %err.code,
                    "join-room failed"
                ),
            }
        }
        ACTION_SEND_PAYLOAD => {
            let request: SendPayloadRequest = match serde_json::from_value(frame) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(connection_id = %ctx.connection_id, %e, "invalid send-payload body");
                    return;
                }
            };
            let response = send_payload(state.dispatcher.as_ref(), ctx, request).await;
            if !response.success {
                tracing::debug!(
                    connection_id = %ctx.connection_id,
                    message = response.message.as_deref().unwrap_or_default(),
                    "send-payload rejected"
                );
            }
        }
        other => {
            tracing::debug!(connection_id = %ctx.connection_id, action = %other, "unknown action");
        }
    }
}
