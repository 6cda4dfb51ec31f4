//! Service token management for calls to the protection API

use crate::client::models::TokenResponse;
use crate::client::{read_json, ClientConfig, ClientError};
use crate::token::{now_secs, AccessToken};
use log::{debug, warn};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
struct ServiceTokens {
    access_token: String,
    refresh_token: Option<String>,
}

/// Obtains and caches the resource server's own access token.
///
/// The cached pair is shared between clones. Concurrent callers that find it
/// stale wait for a single renewal instead of each fetching a new one.
#[derive(Clone)]
pub struct ServiceTokenProvider {
    http: Client,
    config: Arc<ClientConfig>,
    token_endpoint: String,
    slot: Arc<RwLock<Option<ServiceTokens>>>,
    renewal: Arc<Mutex<()>>,
}

impl ServiceTokenProvider {
    pub fn new(http: Client, config: Arc<ClientConfig>, token_endpoint: String) -> Self {
        Self {
            http,
            config,
            token_endpoint,
            slot: Arc::new(RwLock::new(None)),
            renewal: Arc::new(Mutex::new(())),
        }
    }

    /// Return a service token valid for at least the configured minimum time to live
    pub async fn get_token(&self) -> Result<String, ClientError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _renewal = self.renewal.lock().await;
        // Renewed by another caller while this one waited
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let cached = self.slot.read().await.clone();
        let now = now_secs();
        let min_ttl = self.config.token_minimum_time_to_live;
        if let Some(tokens) = cached {
            match AccessToken::decode(&tokens.access_token) {
                Ok(_) => {
                    if let Some(refresh_token) = tokens.refresh_token.as_deref() {
                        if is_usable(refresh_token, min_ttl, now) {
                            match self.refresh(refresh_token).await {
                                Ok(response) => return Ok(self.store(response).await),
                                Err(e) => warn!("Failed to refresh service token: {}", e),
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Discarding unreadable service token: {}", e);
                    *self.slot.write().await = None;
                }
            }
        }

        let response = self.grant().await?;
        Ok(self.store(response).await)
    }

    async fn cached_token(&self) -> Option<String> {
        let slot = self.slot.read().await;
        let tokens = slot.as_ref()?;
        is_usable(&tokens.access_token, self.config.token_minimum_time_to_live, now_secs())
            .then(|| tokens.access_token.clone())
    }

    async fn store(&self, response: TokenResponse) -> String {
        let access_token = response.access_token.clone();
        *self.slot.write().await = Some(ServiceTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        });
        access_token
    }

    async fn grant(&self) -> Result<TokenResponse, ClientError> {
        let mut form: Vec<(&'static str, String)> = Vec::new();
        match &self.config.service_account {
            Some(account) => {
                debug!("Obtaining service token for user '{}'", account.username);
                form.push(("grant_type", "password".to_string()));
                form.push(("username", account.username.clone()));
                form.push(("password", account.password.clone()));
                if let Some(scope) = &account.scope {
                    form.push(("scope", scope.clone()));
                }
            }
            None => {
                debug!("Obtaining service token for client '{}'", self.config.resource);
                form.push(("grant_type", "client_credentials".to_string()));
            }
        }
        self.send(form).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        debug!("Refreshing service token");
        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        self.send(form).await
    }

    async fn send(&self, mut form: Vec<(&'static str, String)>) -> Result<TokenResponse, ClientError> {
        let builder = self.http.post(&self.token_endpoint);
        let builder = self.config.authenticate(builder, &mut form);
        let response = builder.form(&form).send().await?;
        read_json(response).await
    }
}

fn is_usable(raw: &str, min_ttl: i64, now: i64) -> bool {
    AccessToken::decode(raw)
        .map(|token| token.is_active_at(now) && token.has_time_to_live(min_ttl, now))
        .unwrap_or(false)
}
