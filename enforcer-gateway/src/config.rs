use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File};
use policy_enforcer::EnforcerConfig;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE_VAR: &str = "ENFORCER_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "enforcer";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of the enforcing gateway.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    /// The port the gateway listens on (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL granted requests are forwarded to
    pub upstream_url: String,

    /// Timeout in seconds for upstream requests (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Largest request body buffered for evaluation, in bytes (default: 1 MiB)
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,

    /// Policy enforcer configuration
    pub enforcer: EnforcerConfig,
}

impl GatewaySettings {
    /// Load settings from the optional configuration file named by
    /// `ENFORCER_CONFIG_FILE` (any format the `config` crate reads) and
    /// `ENFORCER_*` environment variables, e.g. `ENFORCER_ENFORCER__REALM`.
    pub fn new() -> Result<Self, ConfigError> {
        let file =
            std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let builder = ::config::Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(environment());
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.upstream_url)
            .map_err(|e| ConfigError::Invalid(format!("upstream_url: {}", e)))?;
        url::Url::parse(&self.enforcer.auth_server_url)
            .map_err(|e| ConfigError::Invalid(format!("enforcer.auth_server_url: {}", e)))?;
        if self.enforcer.realm.is_empty() || self.enforcer.resource.is_empty() {
            return Err(ConfigError::Invalid(
                "enforcer.realm and enforcer.resource are required".to_string(),
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(
        auth_server: &wiremock::MockServer,
        upstream: &wiremock::MockServer,
    ) -> Self {
        let mut enforcer = EnforcerConfig::new(&auth_server.uri(), "shop", "orders-api");
        enforcer.credentials.secret = Some("secret".to_string());
        Self {
            port: 0,
            upstream_url: upstream.uri(),
            request_timeout: 5,
            body_limit: 1024,
            enforcer,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("ENFORCER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_body_limit() -> usize {
    1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;
    use policy_enforcer::EnforcementMode;
    use std::collections::HashMap;

    const FILE: &str = r#"{
        "upstream_url": "http://orders:9000",
        "enforcer": {
            "auth_server_url": "http://keycloak:8080",
            "realm": "shop",
            "resource": "orders-api",
            "paths": [{"path": "/orders/{id}", "scopes": ["read"]}]
        }
    }"#;

    fn builder(env: &[(&str, &str)]) -> ConfigBuilder<DefaultState> {
        let vars: HashMap<String, String> = env
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ::config::Config::builder()
            .add_source(File::from_str(FILE, FileFormat::Json))
            .add_source(environment().source(Some(vars)))
    }

    #[test]
    fn test_defaults_from_file() {
        let settings = GatewaySettings::build(builder(&[])).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.request_timeout, 30);
        assert_eq!(settings.body_limit, 1024 * 1024);
        assert_eq!(settings.enforcer.realm, "shop");
        assert_eq!(settings.enforcer.paths.len(), 1);
        assert_eq!(settings.enforcer.enforcement_mode, EnforcementMode::Enforcing);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = GatewaySettings::build(builder(&[
            ("ENFORCER_PORT", "7000"),
            ("ENFORCER_ENFORCER__ENFORCEMENT_MODE", "PERMISSIVE"),
            ("ENFORCER_ENFORCER__CREDENTIALS__SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 7000);
        assert_eq!(settings.enforcer.enforcement_mode, EnforcementMode::Permissive);
        assert_eq!(settings.enforcer.credentials.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_invalid_upstream() {
        let result = GatewaySettings::build(builder(&[("ENFORCER_UPSTREAM_URL", "not a url")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
