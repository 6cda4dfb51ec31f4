use crate::config::GatewaySettings;
use policy_enforcer::{EnforcerError, PolicyEnforcer};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<GatewaySettings>,
    pub enforcer: Arc<PolicyEnforcer>,
    pub upstream_client: Arc<Client>,
}

impl AppState {
    fn create_upstream_client(timeout: u64) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            // Redirects are relayed to the caller
            .redirect(reqwest::redirect::Policy::none())
            .build()
    }

    /// Discover the authorization server and build the enforcer.
    pub async fn new(settings: GatewaySettings) -> Result<Self, EnforcerError> {
        let enforcer = PolicyEnforcer::new(settings.enforcer.clone()).await?;
        Self::with_enforcer(settings, enforcer)
    }

    pub fn with_enforcer(
        settings: GatewaySettings,
        enforcer: PolicyEnforcer,
    ) -> Result<Self, EnforcerError> {
        let upstream_client = Self::create_upstream_client(settings.request_timeout)
            .map_err(|e| EnforcerError::Config(format!("upstream client: {}", e)))?;
        Ok(Self {
            settings: Arc::new(settings),
            enforcer: Arc::new(enforcer),
            upstream_client: Arc::new(upstream_client),
        })
    }

    /// Join the upstream base URL with the request path and query.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.settings.upstream_url.trim_end_matches('/'),
            path_and_query
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;

    #[tokio::test]
    async fn test_upstream_url_joins_path() {
        let fixture = TestFixture::new().await;
        let url = fixture.state.upstream_url("/orders/1?x=y");
        assert_eq!(url, format!("{}/orders/1?x=y", fixture.upstream_mock.uri()));
    }

    #[tokio::test]
    async fn test_state_clone_shares_enforcer() {
        let fixture = TestFixture::new().await;
        let state = fixture.state.clone();
        assert!(std::sync::Arc::ptr_eq(&state.enforcer, &fixture.state.enforcer));
        assert_eq!(state.enforcer.config().realm, "shop");
    }
}
