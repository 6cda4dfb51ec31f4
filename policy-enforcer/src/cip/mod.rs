//! Claim information points.
//!
//! A claim information point derives claims from the current request, either
//! from placeholders (`claims`) or by calling an external service (`http`).
//! Claims are pushed to the authorization server with permission requests and
//! checked against claim constraints attached to granted permissions.

pub mod claims;
pub mod http;

use crate::config::ClaimInformationPointConfig;
use crate::placeholders::{PlaceholderContext, PlaceholderError, Placeholders};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Claim name to claim values
pub type Claims = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Unknown claim information point provider '{0}'")]
    UnknownProvider(String),
    #[error("Invalid configuration for provider '{0}': {1}")]
    InvalidConfig(&'static str, String),
    #[error("Placeholder error: {0}")]
    Placeholder(#[from] PlaceholderError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response from claim information point [{url}]: HTTP {status}")]
    Status { url: String, status: u16 },
}

#[async_trait]
pub trait ClaimInformationPointProvider: Send + Sync {
    async fn resolve(&self, context: &PlaceholderContext<'_>) -> Result<Claims, ClaimError>;
}

/// Creates providers from their configuration section.
pub trait ClaimProviderFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(
        &self,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn ClaimInformationPointProvider>, ClaimError>;
}

/// The set of known provider factories.
#[derive(Clone)]
pub struct ClaimRegistry {
    factories: HashMap<&'static str, Arc<dyn ClaimProviderFactory>>,
}

impl ClaimRegistry {
    /// Registry with the built-in `claims` and `http` providers.
    pub fn new(client: Client, placeholders: Placeholders) -> Self {
        Self {
            factories: HashMap::new(),
        }
        .with_factory(claims::ClaimsProviderFactory::new(placeholders.clone()))
        .with_factory(http::HttpProviderFactory::new(client, placeholders))
    }

    pub fn with_factory<F: ClaimProviderFactory + 'static>(mut self, factory: F) -> Self {
        self.factories.insert(factory.name(), Arc::new(factory));
        self
    }

    /// Drop configuration entries that cannot produce a provider, logging why.
    pub fn validate(&self, config: &mut ClaimInformationPointConfig) {
        config.retain(|name, settings| match self.create(name, settings) {
            Ok(_) => true,
            Err(e) => {
                error!("Ignoring claim information point '{}': {}", name, e);
                false
            }
        });
    }

    pub fn build(
        &self,
        config: &ClaimInformationPointConfig,
    ) -> Result<Vec<Arc<dyn ClaimInformationPointProvider>>, ClaimError> {
        config
            .iter()
            .map(|(name, settings)| self.create(name, settings))
            .collect()
    }

    fn create(
        &self,
        name: &str,
        settings: &Map<String, Value>,
    ) -> Result<Arc<dyn ClaimInformationPointProvider>, ClaimError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ClaimError::UnknownProvider(name.to_string()))?;
        factory.create(settings)
    }
}

/// Run every provider in order; later providers overwrite earlier claims.
pub async fn resolve_all(
    providers: &[Arc<dyn ClaimInformationPointProvider>],
    context: &PlaceholderContext<'_>,
) -> Result<Claims, ClaimError> {
    let mut claims = Claims::new();
    for provider in providers {
        claims.extend(provider.resolve(context).await?);
    }
    debug!("Resolved {} claim(s)", claims.len());
    Ok(claims)
}

/// Values of a setting that may be a single string or a list of strings.
pub(crate) fn string_values(
    provider: &'static str,
    key: &str,
    value: &Value,
) -> Result<Vec<String>, ClaimError> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(ClaimError::InvalidConfig(
                    provider,
                    format!("'{}' must contain strings, found {}", key, other),
                )),
            })
            .collect(),
        other => Err(ClaimError::InvalidConfig(
            provider,
            format!("'{}' must be a string or a list of strings, found {}", key, other),
        )),
    }
}
