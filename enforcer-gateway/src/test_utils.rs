use crate::config::GatewaySettings;
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use policy_enforcer::PolicyEnforcer;
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

/// Gateway wired to a mocked authorization server and a mocked upstream.
///
/// The enforcer protects `/orders` (resource `orders`, scope `read`) and
/// `/orders/{id}`, and leaves `/public` unenforced.
pub struct TestFixture {
    pub app: Router,
    pub state: AppState,
    pub settings: GatewaySettings,
    pub auth_mock: MockServer,
    pub upstream_mock: MockServer,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    /// Create a fixture after adjusting the default settings.
    pub async fn with_settings(configure: impl FnOnce(&mut GatewaySettings)) -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let auth_mock = MockServer::start().await;
        let upstream_mock = MockServer::start().await;
        mount_discovery(&auth_mock).await;

        let mut settings = GatewaySettings::for_test_with_mocks(&auth_mock, &upstream_mock);
        settings.enforcer.paths = serde_json::from_value(json!([
            {"id": "orders", "path": "/orders", "scopes": ["read"]},
            {"id": "orders", "path": "/orders/{id}", "scopes": ["read"]},
            {"path": "/public", "enforcement_mode": "DISABLED"}
        ]))
        .expect("Failed to build test paths");
        configure(&mut settings);

        let state = build_state(&settings).await;
        Self {
            app: create_app(state.clone()),
            state,
            settings,
            auth_mock,
            upstream_mock,
        }
    }

    /// Rebuild the application from the (modified) settings.
    pub async fn rebuild(&mut self) {
        self.state = build_state(&self.settings).await;
        self.app = create_app(self.state.clone());
    }

    /// An unsigned access token granting `(resource id, scope)` permissions.
    pub fn token(&self, permissions: &[(&str, &str)]) -> String {
        let permissions: Vec<Value> = permissions
            .iter()
            .map(|(rsid, scope)| json!({"rsid": rsid, "scopes": [scope]}))
            .collect();
        let claims = json!({
            "sub": "alice",
            "authorization": {"permissions": permissions}
        });
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    pub fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        token: Option<&str>,
    ) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder
    }

    pub async fn get(&self, uri: impl AsRef<str>, token: Option<&str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri, token)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_with_headers<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        token: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let mut builder = self
            .request_builder(Method::POST, uri, Some(token))
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }

    pub fn issuer(&self) -> String {
        format!("{}/realms/shop", self.auth_mock.uri())
    }
}

async fn build_state(settings: &GatewaySettings) -> AppState {
    let enforcer = PolicyEnforcer::new(settings.enforcer.clone())
        .await
        .expect("Failed to create policy enforcer");
    AppState::with_enforcer(settings.clone(), enforcer).expect("Failed to create app state")
}

async fn mount_discovery(server: &MockServer) {
    let base = format!("{}/realms/shop", server.uri());
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/realms/shop/.well-known/uma2-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "token_endpoint": format!("{}/protocol/openid-connect/token", base),
            "permission_endpoint": format!("{}/authz/protection/permission", base),
            "resource_registration_endpoint": format!("{}/authz/protection/resource_set", base),
        })))
        .mount(server)
        .await;
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, status: StatusCode) {
        assert_eq!(
            self.status, status,
            "Expected status {}, got {} with body {}",
            status, self.status, self.json
        );
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}
