use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Settings for the in-process mock backend.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct MockBackendConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Lifetime of issued access tokens. Refresh tokens do not expire.
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Artificial latency added to `/auth/refresh`, to watch requests queue.
    #[serde(default)]
    pub refresh_delay_ms: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_access_token_ttl_secs() -> i64 {
    900
}

fn default_jwt_secret() -> String {
    "storefront-mock-secret".to_string()
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        MockBackendConfig {
            bind_address: default_bind_address(),
            access_token_ttl_secs: default_access_token_ttl_secs(),
            jwt_secret: default_jwt_secret(),
            refresh_delay_ms: 0,
        }
    }
}
