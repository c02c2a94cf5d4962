use std::collections::HashMap;

/// Suffix of the env vars that carry per-client token secrets
/// (`ACME_SECRET_KEY` holds the secret for client namespace `ACME`).
const SECRET_KEY_SUFFIX: &str = "_SECRET_KEY";

/// Rooms expire this long after their last join unless `ROOM_TTL_SECS` says otherwise.
pub const DEFAULT_ROOM_TTL_SECS: u64 = 12 * 3600;

/// How signaling events reach a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Deliver through this process's own connection registry.
    Local,
    /// POST to the `@connections` management API at `{scheme}://{domain}/{stage}`.
    Management,
}

impl DispatchMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "management" => Some(Self::Management),
            _ => None,
        }
    }
}

/// Signal API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Deployment stage; the path segment in front of `@connections`.
    pub stage: String,
    /// Redis connection string. `None` selects the in-memory room store.
    pub redis_url: Option<String>,
    /// Seconds a room lives after the most recent join.
    pub room_ttl_secs: u64,
    /// Delete a room record as soon as a prune leaves it with no members.
    /// When false, emptied rooms are left to TTL expiry.
    pub delete_empty_rooms: bool,
    pub dispatch_mode: DispatchMode,
    /// Scheme used to reach the management endpoint (`https` in production).
    pub management_scheme: String,
    /// Expose this server's own `/{stage}/@connections/{id}` API.
    pub management_api_enabled: bool,
    /// Domain reported to handlers as `domainName`. Falls back to the `Host` header.
    pub public_domain: Option<String>,
    /// HS256 secrets keyed by client namespace.
    pub client_secrets: HashMap<String, String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a variable is present but unparseable.
    pub fn from_env() -> Self {
        let dispatch_mode = match std::env::var("DISPATCH_MODE") {
            Ok(v) => DispatchMode::parse(&v)
                .unwrap_or_else(|| panic!("DISPATCH_MODE must be `local` or `management`, got {v:?}")),
            Err(_) => DispatchMode::Local,
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
            stage: std::env::var("STAGE").unwrap_or_else(|_| "dev".to_string()),
            redis_url: optional_var("REDIS_URL"),
            room_ttl_secs: std::env::var("ROOM_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ROOM_TTL_SECS),
            delete_empty_rooms: flag_var("DELETE_EMPTY_ROOMS"),
            dispatch_mode,
            management_scheme: std::env::var("MANAGEMENT_SCHEME")
                .unwrap_or_else(|_| "https".to_string()),
            management_api_enabled: flag_var("MANAGEMENT_API_ENABLED"),
            public_domain: optional_var("PUBLIC_DOMAIN"),
            client_secrets: client_secrets_from(std::env::vars()),
        }
    }

    /// The HS256 secret for `client`, if one is configured.
    pub fn client_secret(&self, client: &str) -> Option<&str> {
        self.client_secrets.get(client).map(String::as_str)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn flag_var(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => false,
    }
}

fn client_secrets_from(vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.filter_map(|(name, value)| {
        let client = name.strip_suffix(SECRET_KEY_SUFFIX)?;
        if client.is_empty() || value.is_empty() {
            return None;
        }
        Some((client.to_string(), value))
    })
    .collect()
}
