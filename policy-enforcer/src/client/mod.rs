//! Client for the authorization server's UMA endpoints.
//!
//! The client is created from the server's discovery document and exposes
//! the token endpoint (UMA grants), the resource registration API, the
//! permission ticket endpoint and RPT introspection. Calls to the protection
//! API authenticate with a service token obtained by [`ServiceTokenProvider`].

pub mod authorization;
pub mod models;
pub mod permission;
pub mod protection;
pub mod resources;
pub mod service_token;

use crate::client::models::ServerConfiguration;
use crate::config::{EnforcerConfig, ServiceAccount};
use crate::token::TokenError;
use log::{debug, error, info};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub use crate::client::service_token::ServiceTokenProvider;

/// Errors that can occur while talking to the authorization server
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Authorization server error (HTTP {status}): {body}")]
    Api { status: u16, body: String },
    #[error("Authorization denied: {0}")]
    Denied(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid token: {0}")]
    Token(#[from] TokenError),
    #[error("Endpoint not advertised by the server: {0}")]
    MissingEndpoint(&'static str),
}

/// Connection settings of the resource server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub auth_server_url: String,
    pub realm: String,
    /// Client id of the resource server
    pub resource: String,
    pub secret: Option<String>,
    pub service_account: Option<ServiceAccount>,
    pub token_minimum_time_to_live: i64,
    pub bearer_only: bool,
    pub request_timeout: u64,
}

impl From<&EnforcerConfig> for ClientConfig {
    fn from(config: &EnforcerConfig) -> Self {
        Self {
            auth_server_url: config.auth_server_url.clone(),
            realm: config.realm.clone(),
            resource: config.resource.clone(),
            secret: config.credentials.secret.clone(),
            service_account: config.service_account.clone(),
            token_minimum_time_to_live: config.token_minimum_time_to_live,
            bearer_only: config.bearer_only,
            request_timeout: config.request_timeout,
        }
    }
}

impl ClientConfig {
    pub fn discovery_url(&self) -> Result<Url, ClientError> {
        let base = self.auth_server_url.trim_end_matches('/');
        Ok(Url::parse(&format!(
            "{}/realms/{}/.well-known/uma2-configuration",
            base, self.realm
        ))?)
    }

    /// Authenticate a token endpoint request as the resource server.
    ///
    /// With a secret the credentials go in a Basic header, otherwise the
    /// client id is sent as a form parameter (public client).
    pub(crate) fn authenticate(
        &self,
        builder: RequestBuilder,
        form: &mut Vec<(&'static str, String)>,
    ) -> RequestBuilder {
        match &self.secret {
            Some(secret) => builder.basic_auth(&self.resource, Some(secret)),
            None => {
                form.push(("client_id", self.resource.clone()));
                builder
            }
        }
    }
}

/// Authorization server client
#[derive(Clone)]
pub struct AuthzClient {
    http: Client,
    config: Arc<ClientConfig>,
    server: Arc<ServerConfiguration>,
    tokens: ServiceTokenProvider,
}

impl std::fmt::Debug for AuthzClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthzClient")
            .field("realm", &self.config.realm)
            .field("issuer", &self.server.issuer)
            .finish_non_exhaustive()
    }
}

impl AuthzClient {
    /// Fetch the discovery document and create a client for the advertised endpoints
    pub async fn discover(config: ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        Self::discover_with(http, config).await
    }

    pub async fn discover_with(http: Client, config: ClientConfig) -> Result<Self, ClientError> {
        let url = config.discovery_url()?;
        debug!("Fetching UMA configuration from {}", url);

        let response = http.get(url.clone()).send().await?;
        let server: ServerConfiguration = read_json(response).await?;
        info!(
            "Discovered authorization server '{}' for realm '{}'",
            server.issuer, config.realm
        );

        let config = Arc::new(config);
        let tokens = ServiceTokenProvider::new(
            http.clone(),
            config.clone(),
            server.token_endpoint.clone(),
        );

        Ok(Self {
            http,
            config,
            server: Arc::new(server),
            tokens,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn server_configuration(&self) -> &ServerConfiguration {
        &self.server
    }

    pub fn service_tokens(&self) -> &ServiceTokenProvider {
        &self.tokens
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn endpoint(
        &self,
        endpoint: &Option<String>,
        name: &'static str,
    ) -> Result<String, ClientError> {
        endpoint.clone().ok_or(ClientError::MissingEndpoint(name))
    }
}

/// Decode a successful JSON response or turn the failure into [`ClientError::Api`].
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Authorization server error {}: {}", status, body);
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}
