//! Client chat tokens: HS256 JWTs scoped to one client namespace.

use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Claims carried by a chat token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatClaims {
    /// Namespace the token was issued for.
    pub client: String,
    /// Expiry in epoch seconds.
    #[serde(rename = "expiresAt")]
    pub expires_at: ExpiresAt,
}

/// Issuers send the expiry either as a number or as a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpiresAt {
    Seconds(f64),
    Text(String),
}

impl ExpiresAt {
    fn as_secs(&self) -> Option<f64> {
        match self {
            Self::Seconds(secs) => Some(*secs),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Why a token was refused. Callers only ever see a deny; this is for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    MissingToken,
    UnknownClient,
    Malformed,
    MismatchedClient,
    Expired,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::MissingToken => "no token supplied",
            Self::UnknownClient => "no secret configured for client",
            Self::Malformed => "token could not be decoded",
            Self::MismatchedClient => "token belongs to another client",
            Self::Expired => "token has expired",
        };
        f.write_str(reason)
    }
}

impl std::error::Error for TokenError {}

/// Outcome of the authorization gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Verify `token` with `secret` and check that it belongs to `client` and
/// expires after `now` (epoch seconds).
pub fn validate_chat_token(
    secret: &str,
    client: &str,
    token: &str,
    now: f64,
) -> Result<ChatClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry lives in the custom `expiresAt` claim, not `exp`.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = jsonwebtoken::decode::<ChatClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| TokenError::Malformed)?
    .claims;

    if claims.client != client {
        return Err(TokenError::MismatchedClient);
    }
    match claims.expires_at.as_secs() {
        Some(expires_at) if expires_at > now => Ok(claims),
        Some(_) => Err(TokenError::Expired),
        None => Err(TokenError::Malformed),
    }
}

/// The gate run before a connection is accepted. Every failure is a plain deny.
pub fn authorize(config: &Config, client: &str, token: Option<&str>) -> Decision {
    let result = token
        .filter(|t| !t.is_empty())
        .ok_or(TokenError::MissingToken)
        .and_then(|token| {
            let secret = config
                .client_secret(client)
                .ok_or(TokenError::UnknownClient)?;
            validate_chat_token(secret, client, token, now_secs())
        });

    match result {
        Ok(_) => Decision::Allow,
        Err(reason) => {
            tracing::debug!(%client, %reason, "connection denied");
            Decision::Deny
        }
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;
    use crate::config::{DispatchMode, DEFAULT_ROOM_TTL_SECS};

    const SECRET: &str = "acme-secret";

    fn mint(claims: serde_json::Value, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn config() -> Config {
        Config {
            port: 0,
            stage: "dev".into(),
            redis_url: None,
            room_ttl_secs: DEFAULT_ROOM_TTL_SECS,
            delete_empty_rooms: false,
            dispatch_mode: DispatchMode::Local,
            management_scheme: "http".into(),
            management_api_enabled: false,
            public_domain: None,
            client_secrets: HashMap::from([("ACME".to_string(), SECRET.to_string())]),
        }
    }

    #[test]
    fn valid_token_is_accepted() {
        let token = mint(json!({ "client": "ACME", "expiresAt": 2000.0 }), SECRET);
        let claims = validate_chat_token(SECRET, "ACME", &token, 1000.0).unwrap();
        assert_eq!(claims.client, "ACME");
    }

    #[test]
    fn string_expiry_is_accepted() {
        let token = mint(json!({ "client": "ACME", "expiresAt": "2000" }), SECRET);
        assert!(validate_chat_token(SECRET, "ACME", &token, 1000.0).is_ok());
    }

    #[test]
    fn expired_token_is_refused() {
        let token = mint(json!({ "client": "ACME", "expiresAt": 999 }), SECRET);
        assert_eq!(
            validate_chat_token(SECRET, "ACME", &token, 1000.0).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn token_for_another_client_is_refused() {
        let token = mint(json!({ "client": "OTHER", "expiresAt": 2000 }), SECRET);
        assert_eq!(
            validate_chat_token(SECRET, "ACME", &token, 1000.0).unwrap_err(),
            TokenError::MismatchedClient
        );
    }

    #[test]
    fn wrong_secret_or_garbage_is_malformed() {
        let token = mint(json!({ "client": "ACME", "expiresAt": 2000 }), "not-the-secret");
        assert_eq!(
            validate_chat_token(SECRET, "ACME", &token, 1000.0).unwrap_err(),
            TokenError::Malformed
        );
        assert_eq!(
            validate_chat_token(SECRET, "ACME", "garbage", 1000.0).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn unparseable_expiry_is_malformed() {
        let token = mint(json!({ "client": "ACME", "expiresAt": "soon" }), SECRET);
        assert_eq!(
            validate_chat_token(SECRET, "ACME", &token, 1000.0).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn gate_collapses_every_failure_to_deny() {
        let config = config();
        let future = now_secs() + 600.0;
        let good = mint(json!({ "client": "ACME", "expiresAt": future }), SECRET);

        assert_eq!(authorize(&config, "ACME", Some(&good)), Decision::Allow);
        assert_eq!(authorize(&config, "ACME", None), Decision::Deny);
        assert_eq!(authorize(&config, "ACME", Some("")), Decision::Deny);
        assert_eq!(authorize(&config, "UNKNOWN", Some(&good)), Decision::Deny);

        let stale = mint(json!({ "client": "ACME", "expiresAt": now_secs() - 1.0 }), SECRET);
        assert_eq!(authorize(&config, "ACME", Some(&stale)), Decision::Deny);
    }
}
