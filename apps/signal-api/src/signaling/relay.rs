//! `send-payload`: forward an arbitrary payload from one connection to another.

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::dispatcher::Dispatcher;
use super::events::{EventName, RequestContext, SendPayloadRequest, SignalEvent};

/// Reply to a relay request. `success` reflects input validation only; a
/// payload addressed to a dead connection still reports success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RelayResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RelayResponse {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
        }
    }
}

pub async fn send_payload(
    dispatcher: &dyn Dispatcher,
    ctx: &RequestContext,
    request: SendPayloadRequest,
) -> RelayResponse {
    let target = request.target.filter(|t| !t.is_empty());
    let payload = match request.payload {
        Some(Value::Object(fields)) if !fields.is_empty() => Some(fields),
        _ => None,
    };
    let (Some(target), Some(payload)) = (target, payload) else {
        return RelayResponse::rejected("must include a payload and a target");
    };

    let event = relay_event(&ctx.connection_id, payload);
    if let Err(err) = dispatcher.send(&target, &event, &ctx.domain_name).await {
        tracing::debug!(
            from = %ctx.connection_id,
            %target,
            event_type = %event.event_type,
            %err,
            "relay target unreachable"
        );
    }

    RelayResponse::ok()
}

/// Tag the payload with its own `type` (default `payload`) and stamp the
/// sender's connection id, which the payload may override.
fn relay_event(sender: &str, payload: Map<String, Value>) -> SignalEvent {
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(EventName::PAYLOAD)
        .to_string();

    let mut data = Map::new();
    data.insert("connectionId".to_string(), Value::String(sender.to_string()));
    data.extend(payload);

    SignalEvent::new(event_type, Value::Object(data))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::signaling::dispatcher::DispatchError;

    #[derive(Default)]
    struct CapturingDispatcher {
        fail: bool,
        sent: Mutex<Vec<(String, SignalEvent, String)>>,
    }

    #[async_trait]
    impl Dispatcher for CapturingDispatcher {
        async fn send(
            &self,
            connection_id: &str,
            event: &SignalEvent,
            domain: &str,
        ) -> Result<(), DispatchError> {
            self.sent
                .lock()
                .push((connection_id.to_string(), event.clone(), domain.to_string()));
            if self.fail {
                Err(DispatchError::Gone)
            } else {
                Ok(())
            }
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            connection_id: "conn_sender".to_string(),
            domain_name: "signal.test".to_string(),
        }
    }

    fn request(body: Value) -> SendPayloadRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn forwards_typed_payload_with_sender_id() {
        let dispatcher = CapturingDispatcher::default();
        let resp = send_payload(
            &dispatcher,
            &ctx(),
            request(json!({
                "target": "conn_peer",
                "payload": { "type": "offer", "offererId": "p1", "offer": { "sdp": "v=0" } }
            })),
        )
        .await;

        assert_eq!(resp, RelayResponse::ok());
        let sent = dispatcher.sent.lock();
        assert_eq!(sent.len(), 1);
        let (to, event, domain) = &sent[0];
        assert_eq!(to, "conn_peer");
        assert_eq!(domain, "signal.test");
        assert_eq!(event.event_type, "offer");
        assert_eq!(
            event.data,
            json!({
                "connectionId": "conn_sender",
                "type": "offer",
                "offererId": "p1",
                "offer": { "sdp": "v=0" }
            })
        );
    }

    #[tokio::test]
    async fn untyped_payload_defaults_to_payload() {
        let dispatcher = CapturingDispatcher::default();
        send_payload(
            &dispatcher,
            &ctx(),
            request(json!({ "target": "conn_peer", "payload": { "hello": 1 } })),
        )
        .await;

        let sent = dispatcher.sent.lock();
        assert_eq!(sent[0].1.event_type, EventName::PAYLOAD);
    }

    #[tokio::test]
    async fn payload_may_override_connection_id() {
        let dispatcher = CapturingDispatcher::default();
        send_payload(
            &dispatcher,
            &ctx(),
            request(json!({ "target": "conn_peer", "payload": { "connectionId": "spoofed" } })),
        )
        .await;

        assert_eq!(dispatcher.sent.lock()[0].1.data["connectionId"], "spoofed");
    }

    #[tokio::test]
    async fn missing_target_or_payload_is_rejected_without_sending() {
        let dispatcher = CapturingDispatcher::default();
        for body in [
            json!({ "payload": { "type": "offer" } }),
            json!({ "target": "conn_peer" }),
            json!({ "target": "", "payload": { "type": "offer" } }),
            json!({ "target": "conn_peer", "payload": {} }),
            json!({ "target": "conn_peer", "payload": "not an object" }),
        ] {
            let resp = send_payload(&dispatcher, &ctx(), request(body)).await;
            assert!(!resp.success);
            assert_eq!(resp.message.as_deref(), Some("must include a payload and a target"));
        }
        assert!(dispatcher.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn unreachable_target_still_reports_success() {
        let dispatcher = CapturingDispatcher {
            fail: true,
            ..Default::default()
        };
        let resp = send_payload(
            &dispatcher,
            &ctx(),
            request(json!({ "target": "conn_gone", "payload": { "type": "answer" } })),
        )
        .await;
        assert!(resp.success);
    }

    #[test]
    fn success_body_omits_message() {
        let body = serde_json::to_value(RelayResponse::ok()).unwrap();
        assert_eq!(body, json!({ "success": true }));
    }
}
