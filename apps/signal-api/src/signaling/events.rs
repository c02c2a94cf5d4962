//! Signaling wire formats: outbound event envelope and inbound request bodies.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event types sent to clients.
pub struct EventName;

impl EventName {
    pub const SOMEONE_JOINED: &'static str = "someone_joined";
    pub const FIRST_TO_JOIN: &'static str = "first_to_join";
    /// Default type for relayed payloads that do not name one.
    pub const PAYLOAD: &'static str = "payload";
}

// ---------------------------------------------------------------------------
// Server → Client envelope
// ---------------------------------------------------------------------------

/// A tagged event delivered to one connection: `{ "type": ..., "data": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SignalEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[schema(value_type = Object)]
    pub data: Value,
}

impl SignalEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Transport context
// ---------------------------------------------------------------------------

/// What the transport layer knows about the connection a request arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub connection_id: String,
    /// Domain of the management endpoint that can reach this connection.
    pub domain_name: String,
}

// ---------------------------------------------------------------------------
// Client → Server bodies
// ---------------------------------------------------------------------------

/// Body of a `join-room` request.
///
/// Fields are only presence-checked. A missing or non-string value becomes
/// `None` and is stored as `null` rather than rejected.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct JoinRoomRequest {
    #[serde(default, rename = "roomId", deserialize_with = "string_or_null")]
    pub room_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub sdp: Option<String>,
    #[serde(default, rename = "id", deserialize_with = "string_or_null")]
    pub peer_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub name: Option<String>,
}

/// Body of a `send-payload` request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SendPayloadRequest {
    #[serde(default, deserialize_with = "string_or_null")]
    pub target: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub payload: Option<Value>,
}

fn string_or_null<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_type_and_data() {
        let event = SignalEvent::new(EventName::FIRST_TO_JOIN, serde_json::json!({ "roomId": "r1" }));
        let v: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(v, serde_json::json!({ "type": "first_to_join", "data": { "roomId": "r1" } }));
    }

    #[test]
    fn join_request_tolerates_missing_and_mistyped_fields() {
        let req: JoinRoomRequest =
            serde_json::from_str(r#"{ "roomId": "r1", "id": 42, "name": null }"#).unwrap();
        assert_eq!(req.room_id.as_deref(), Some("r1"));
        assert_eq!(req.peer_id, None);
        assert_eq!(req.sdp, None);
        assert_eq!(req.name, None);
    }

    #[test]
    fn send_payload_request_reads_target_and_payload() {
        let req: SendPayloadRequest =
            serde_json::from_str(r#"{ "target": "conn_b", "payload": { "type": "offer" } }"#)
                .unwrap();
        assert_eq!(req.target.as_deref(), Some("conn_b"));
        assert_eq!(req.payload.unwrap()["type"], "offer");
    }
}
