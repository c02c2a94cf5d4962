//! Delivery of one event to one connection.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};

use super::events::SignalEvent;

/// Why an event did not reach its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The connection is no longer live.
    Gone,
    /// The management endpoint refused the delivery with this status.
    Rejected(u16),
    /// The endpoint could not be reached.
    Transport(String),
    /// The event could not be serialized.
    Encode(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gone => write!(f, "connection is gone"),
            Self::Rejected(status) => write!(f, "delivery rejected with status {status}"),
            Self::Transport(reason) => write!(f, "transport error: {reason}"),
            Self::Encode(reason) => write!(f, "could not encode event: {reason}"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Sends events to live connections.
///
/// A failed send means "treat this connection as unreachable"; callers decide
/// whether that is an error.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(
        &self,
        connection_id: &str,
        event: &SignalEvent,
        domain: &str,
    ) -> Result<(), DispatchError>;
}

// ---------------------------------------------------------------------------
// Management API dispatcher
// ---------------------------------------------------------------------------

struct ManagementClient {
    http: reqwest::Client,
    /// `{scheme}://{domain}/{stage}`
    endpoint: Url,
}

/// Posts events to an `@connections` management API.
///
/// The endpoint is domain-specific, so one HTTP client is built per domain
/// and reused for every later send to it.
pub struct ManagementApiDispatcher {
    scheme: String,
    stage: String,
    clients: DashMap<String, Arc<ManagementClient>>,
}

impl ManagementApiDispatcher {
    pub fn new(scheme: &str, stage: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            stage: stage.trim_matches('/').to_string(),
            clients: DashMap::new(),
        }
    }

    /// Number of domains with a cached client.
    pub fn cached_domains(&self) -> usize {
        self.clients.len()
    }

    fn client_for(&self, domain: &str) -> Result<Arc<ManagementClient>, DispatchError> {
        if let Some(client) = self.clients.get(domain) {
            return Ok(client.value().clone());
        }

        let raw = format!("{}://{}/{}", self.scheme, domain, self.stage);
        let endpoint = Url::parse(&raw)
            .map_err(|e| DispatchError::Transport(format!("invalid endpoint {raw}: {e}")))?;
        tracing::debug!(%endpoint, "building management client");

        let client = Arc::new(ManagementClient {
            http: reqwest::Client::new(),
            endpoint,
        });
        Ok(self
            .clients
            .entry(domain.to_string())
            .or_insert(client)
            .value()
            .clone())
    }
}

/// `{endpoint}/@connections/{connection_id}`, with the id percent-encoded.
fn connection_url(endpoint: &Url, connection_id: &str) -> Result<Url, DispatchError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| DispatchError::Transport(format!("endpoint {endpoint} cannot take a path")))?
        .pop_if_empty()
        .push("@connections")
        .push(connection_id);
    Ok(url)
}

#[async_trait]
impl Dispatcher for ManagementApiDispatcher {
    async fn send(
        &self,
        connection_id: &str,
        event: &SignalEvent,
        domain: &str,
    ) -> Result<(), DispatchError> {
        let client = self.client_for(domain)?;
        let url = connection_url(&client.endpoint, connection_id)?;
        let body = event
            .to_json()
            .map_err(|e| DispatchError::Encode(e.to_string()))?;

        let resp = client
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::GONE => Err(DispatchError::Gone),
            status => Err(DispatchError::Rejected(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_appends_encoded_id() {
        let endpoint = Url::parse("https://abc.example.com/prod").unwrap();
        let url = connection_url(&endpoint, "Ab1/x=").unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.example.com/prod/@connections/Ab1%2Fx="
        );
    }

    #[test]
    fn one_client_per_domain() {
        let dispatcher = ManagementApiDispatcher::new("https", "/dev/");
        let a1 = dispatcher.client_for("a.example.com").unwrap();
        let a2 = dispatcher.client_for("a.example.com").unwrap();
        let b = dispatcher.client_for("b.example.com").unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(dispatcher.cached_domains(), 2);
        assert_eq!(a1.endpoint.as_str(), "https://a.example.com/dev");
    }

    #[test]
    fn invalid_domain_is_a_transport_error() {
        let dispatcher = ManagementApiDispatcher::new("https", "dev");
        let err = dispatcher.client_for("bad domain").err().unwrap();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert_eq!(dispatcher.cached_domains(), 0);
    }
}
