use crate::errors::ApiError;
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::request::Parts;
use log::debug;
use policy_enforcer::{RequestView, Verdict};
use std::net::SocketAddr;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Ask the policy enforcer about every request before it reaches the upstream.
///
/// The body is buffered so that placeholders can read it; granted requests
/// continue with the buffered body and their `AuthorizationContext` in the
/// request extensions.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, state.settings.body_limit).await {
        Ok(body) => body,
        Err(e) => {
            return ApiError::payload_too_large(format!("Failed to buffer request body: {}", e))
                .into_response();
        }
    };

    let view = request_view(&parts, body.clone());
    let verdict = state.enforcer.enforce(&view, view.bearer_token()).await;

    match verdict {
        Verdict::Granted(context) => {
            let mut request = Request::from_parts(parts, Body::from(body));
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Verdict::Denied(_) => match &state.enforcer.config().on_deny_redirect_to {
            Some(page) => ApiError::redirect(page).into_response(),
            None => ApiError::forbidden().into_response(),
        },
        Verdict::Challenge { www_authenticate } => {
            ApiError::unauthorized(&www_authenticate).into_response()
        }
        Verdict::AuthenticationRequired => {
            debug!("No usable bearer token for {}", parts.uri);
            let realm = &state.enforcer.config().realm;
            ApiError::unauthorized(&format!("Bearer realm=\"{}\"", realm)).into_response()
        }
    }
}

fn request_view(parts: &Parts, body: Bytes) -> RequestView {
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let secure = parts.uri.scheme_str() == Some("https")
        || parts
            .headers
            .get(FORWARDED_PROTO)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));

    let mut view = RequestView::new(parts.method.clone(), uri)
        .with_headers(parts.headers.clone())
        .with_secure(secure);
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        view = view.with_remote_addr(*addr);
    }
    if !body.is_empty() {
        view = view.with_body(body);
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use http::header::{LOCATION, WWW_AUTHENTICATE};
    use http::{Method, Request as HttpRequest, StatusCode};
    use serde_json::json;
    use wiremock::{matchers, Mock, ResponseTemplate};

    async fn mount_upstream(fixture: &TestFixture, path: &str, expected_calls: u64) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path(path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(expected_calls)
            .mount(&fixture.upstream_mock)
            .await;
    }

    #[tokio::test]
    async fn test_granted_request_is_forwarded() {
        let fixture = TestFixture::new().await;
        mount_upstream(&fixture, "/orders/7", 1).await;

        let token = fixture.token(&[("orders", "read")]);
        let response = fixture.get("/orders/7", Some(&token)).await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.json, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_denied_request_is_forbidden() {
        let fixture = TestFixture::new().await;
        mount_upstream(&fixture, "/orders", 0).await;

        // The token endpoint is not mocked, so negotiation is refused
        let token = fixture.token(&[("invoices", "read")]);
        let response = fixture.get("/orders", Some(&token)).await;
        response.assert_status(StatusCode::FORBIDDEN);

        let anonymous = fixture.get("/orders", None).await;
        anonymous.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_denied_request_redirects_to_access_denied_page() {
        let fixture = TestFixture::with_settings(|settings| {
            settings.enforcer.on_deny_redirect_to = Some("/access-denied".to_string());
        })
        .await;

        mount_upstream(&fixture, "/access-denied", 1).await;

        let response = fixture.get("/orders", None).await;
        response.assert_status(StatusCode::FOUND);
        let location = response.header(LOCATION.as_str());
        assert_eq!(location.as_deref(), Some("/access-denied"));

        // Following the redirect must not redirect again
        let landing = fixture.get(location.unwrap_or_default(), None).await;
        landing.assert_status(StatusCode::OK);
        assert_eq!(landing.json, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_malformed_token_is_unauthorized() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/orders", Some("garbage")).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.header(WWW_AUTHENTICATE.as_str()).as_deref(),
            Some("Bearer realm=\"shop\"")
        );
    }

    #[tokio::test]
    async fn test_anonymous_request_receives_uma_challenge() {
        let fixture = TestFixture::with_settings(|settings| {
            settings.enforcer.user_managed_access = true;
            settings.enforcer.bearer_only = true;
        })
        .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/realms/shop/protocol/openid-connect/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": fixture.token(&[]),
                "expires_in": 300
            })))
            .mount(&fixture.auth_mock)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/realms/shop/authz/protection/permission"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ticket": "tkt"})))
            .expect(1)
            .mount(&fixture.auth_mock)
            .await;

        let response = fixture.get("/orders", None).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.header(WWW_AUTHENTICATE.as_str()),
            Some(format!(
                "UMA realm=\"shop\",as_uri=\"{}\",ticket=\"tkt\"",
                fixture.issuer()
            ))
        );
    }

    #[tokio::test]
    async fn test_disabled_path_needs_no_token() {
        let fixture = TestFixture::new().await;
        mount_upstream(&fixture, "/public", 2).await;

        let response = fixture.get("/public", None).await;
        response.assert_status(StatusCode::OK);

        let opaque = fixture.get("/public", Some("opaque-token")).await;
        opaque.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let fixture = TestFixture::new().await;
        let token = fixture.token(&[("orders", "read")]);
        let body = json!({"blob": "x".repeat(fixture.settings.body_limit * 2)});

        let response = fixture.post_with_headers("/orders", &token, &body, &[]).await;
        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_request_view_from_parts() {
        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/orders?channel=web")
            .header("x-forwarded-proto", "HTTPS")
            .header("authorization", "Bearer abc")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5000))));
        let (parts, _) = request.into_parts();

        let view = request_view(&parts, Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(view.relative_path(), "/orders");
        assert_eq!(view.first_parameter("channel"), Some("web"));
        assert!(view.is_secure());
        assert_eq!(view.bearer_token(), Some("abc"));
        assert_eq!(view.remote_addr().map(|a| a.ip().to_string()).as_deref(), Some("10.0.0.7"));
        assert!(view.body().is_some());
    }
}
