use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::mock_backend::MockBackendConfig;
use super::store::StoreConfig;

/// Environment variables with this prefix override file values; nested keys
/// are separated by a double underscore (`STOREFRONT_API__BASE_URL`).
pub const ENV_PREFIX: &str = "STOREFRONT_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mock_backend: Option<MockBackendConfig>,
}

/// Where the backend lives and how long we wait for it.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ApiConfig {
    /// Prefix for every request path, e.g. `http://localhost:5000/api`.
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound on a refresh exchange; queued requests fail when it elapses.
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
    /// Where the UI should send the user once the session is torn down.
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_refresh_timeout_ms() -> u64 {
    10_000
}

fn default_login_path() -> String {
    "/login".to_string()
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        ApiConfig {
            base_url: base_url.into(),
            request_timeout_ms: default_request_timeout_ms(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
            login_path: default_login_path(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

fn extract(figment: Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
    // handle configuration migration between versions here when necessary
}

/// Load config from a YAML file, with `STOREFRONT_` environment overrides.
pub fn load_config(path: &Path) -> Result<ConfigV1, figment::Error> {
    extract(
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__")),
    )
}

/// Parse config from an in-memory YAML document (no environment overrides).
pub fn parse_config(yaml: &str) -> Result<ConfigV1, figment::Error> {
    extract(Figment::new().merge(Yaml::string(yaml)))
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileStoreConfig;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
version: "1.0.0"
api:
  base_url: "http://localhost:5000/api"
"#,
        )
        .unwrap();

        assert_eq!(config.api.request_timeout_ms, 10_000);
        assert_eq!(config.api.login_path, "/login");
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.logging.level, "info");
        assert!(config.mock_backend.is_none());
    }

    #[test]
    fn file_store_and_mock_backend_sections() {
        let config = parse_config(
            r#"
version: "1.0.0"
api:
  base_url: "http://127.0.0.1:5000/api"
  refresh_timeout_ms: 250
store:
  type: file
  path: "/tmp/storefront/session.json"
logging:
  level: debug
  format: json
mock_backend:
  bind_address: "127.0.0.1:5055"
  access_token_ttl_secs: 30
"#,
        )
        .unwrap();

        assert_eq!(config.api.refresh_timeout(), Duration::from_millis(250));
        assert_eq!(
            config.store,
            StoreConfig::File(FileStoreConfig {
                path: "/tmp/storefront/session.json".into()
            })
        );
        let mock = config.mock_backend.unwrap();
        assert_eq!(mock.bind_address, "127.0.0.1:5055");
        assert_eq!(mock.access_token_ttl_secs, 30);
        assert_eq!(mock.jwt_secret, "storefront-mock-secret");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let result = parse_config(
            r#"
version: "0.9.0"
api:
  base_url: "http://localhost"
"#,
        );
        assert!(result.is_err());
    }
}
