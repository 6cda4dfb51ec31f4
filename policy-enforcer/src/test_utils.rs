use crate::client::models::ResourceRepresentation;
use crate::client::{AuthzClient, ClientConfig, ClientError};
use crate::config::{Credentials, EnforcerConfig};
use crate::paths::ResourceFinder;
use crate::token::now_secs;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::LevelFilter;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "shop";
pub const RESOURCE: &str = "orders-api";

pub fn setup_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Encode `claims` as an unsigned JWT.
pub fn encode_token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

/// Mocked authorization server serving the discovery document for [`REALM`].
pub struct AuthServerFixture {
    pub server: MockServer,
}

impl AuthServerFixture {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let fixture = Self { server };

        Mock::given(matchers::method("GET"))
            .and(matchers::path(format!(
                "/realms/{}/.well-known/uma2-configuration",
                REALM
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": fixture.issuer(),
                "token_endpoint": fixture.token_endpoint(),
                "introspection_endpoint": fixture.url(&fixture.introspection_path()),
                "resource_registration_endpoint": fixture.url(&fixture.resource_path()),
                "permission_endpoint": fixture.url(&fixture.permission_path()),
                "policy_endpoint": fixture.url(&format!("/realms/{}/authz/protection/uma-policy", REALM)),
            })))
            .mount(&fixture.server)
            .await;

        fixture
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub fn issuer(&self) -> String {
        self.url(&format!("/realms/{}", REALM))
    }

    pub fn token_path(&self) -> String {
        format!("/realms/{}/protocol/openid-connect/token", REALM)
    }

    pub fn token_endpoint(&self) -> String {
        self.url(&self.token_path())
    }

    pub fn introspection_path(&self) -> String {
        format!("{}/introspect", self.token_path())
    }

    pub fn resource_path(&self) -> String {
        format!("/realms/{}/authz/protection/resource_set", REALM)
    }

    pub fn permission_path(&self) -> String {
        format!("/realms/{}/authz/protection/permission", REALM)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::from(&self.enforcer_config())
    }

    pub fn enforcer_config(&self) -> EnforcerConfig {
        let mut config = EnforcerConfig::new(&self.server.uri(), REALM, RESOURCE);
        config.credentials = Credentials {
            secret: Some("secret".to_string()),
        };
        config
    }

    pub async fn client(&self) -> AuthzClient {
        AuthzClient::discover(self.client_config()).await.unwrap()
    }

    /// Answer client credentials grants with a long-lived service token.
    pub async fn mount_service_token(&self) {
        let token = encode_token(json!({"exp": now_secs() + 3600, "azp": RESOURCE}));
        Mock::given(matchers::method("POST"))
            .and(matchers::path(self.token_path()))
            .and(matchers::body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "expires_in": 3600
            })))
            .mount(&self.server)
            .await;
    }
}

/// In-memory resource registry counting the lookups it serves.
#[derive(Default)]
pub struct FakeFinder {
    pub matching: Mutex<HashMap<String, Vec<ResourceRepresentation>>>,
    pub resources: Mutex<Vec<ResourceRepresentation>>,
    pub matching_calls: AtomicUsize,
    pub fail: bool,
}

impl FakeFinder {
    pub fn with_matching(self, uri: &str, resources: Vec<ResourceRepresentation>) -> Self {
        self.matching
            .lock()
            .unwrap()
            .insert(uri.to_string(), resources);
        self
    }

    pub fn with_resource(self, resource: ResourceRepresentation) -> Self {
        self.resources.lock().unwrap().push(resource);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.matching_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.fail {
            return Err(ClientError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub fn resource(id: &str, name: &str, uris: &[&str], scopes: &[&str]) -> ResourceRepresentation {
    serde_json::from_value(json!({
        "_id": id,
        "name": name,
        "uris": uris,
        "resource_scopes": scopes,
    }))
    .unwrap()
}

#[async_trait]
impl ResourceFinder for FakeFinder {
    async fn find_by_matching_uri(
        &self,
        uri: &str,
    ) -> Result<Vec<ResourceRepresentation>, ClientError> {
        self.matching_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .matching
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_uri(&self, uri: &str) -> Result<Vec<ResourceRepresentation>, ClientError> {
        self.check()?;
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.uris.iter().any(|u| u == uri))
            .cloned()
            .collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ResourceRepresentation>, ClientError> {
        self.check()?;
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<ResourceRepresentation, ClientError> {
        self.check()?;
        self.resources
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .cloned()
            .ok_or(ClientError::Api {
                status: 404,
                body: id.to_string(),
            })
    }

    async fn find_all_ids(&self) -> Result<Vec<String>, ClientError> {
        self.check()?;
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.id.clone())
            .collect())
    }
}
