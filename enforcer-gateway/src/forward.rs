use crate::errors::ApiError;
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::HeaderName;
use log::{debug, error};
use std::error::Error as StdError;

/// Hop-by-hop and framing headers, recomputed on each side.
fn is_skipped(name: &HeaderName) -> bool {
    [HOST, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING].contains(name)
}

/// Forward a granted request to the upstream service and relay its response.
pub async fn forward_to_upstream(State(state): State<AppState>, req: Request) -> Response {
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_default();
    let url = state.upstream_url(&path);
    debug!("Forwarding request upstream: {} {}", req.method(), url);

    let mut builder = state.upstream_client.request(req.method().clone(), &url);
    for (key, value) in req.headers() {
        if !is_skipped(key) {
            builder = builder.header(key, value);
        }
    }

    // Already buffered by the enforcement layer
    let body = match to_bytes(req.into_body(), state.settings.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::bad_gateway(format!("Failed to read request body: {}", e))
                .into_response();
        }
    };
    if !body.is_empty() {
        builder = builder.body(body);
    }

    match builder.send().await {
        Ok(response) => {
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to read upstream response body: {}", e);
                    return ApiError::bad_gateway("Failed to read upstream response body")
                        .into_response();
                }
            };

            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            for (key, value) in headers.iter() {
                if !is_skipped(key) {
                    resp.headers_mut().append(key, value.clone());
                }
            }
            resp
        }
        Err(e) => {
            error!(
                "Failed to reach upstream {}: {} (source: {:?})",
                url,
                e,
                e.source()
            );
            let detail = if e.is_timeout() {
                "Request timed out while waiting for the upstream service".to_string()
            } else if e.is_connect() {
                "Connection error occurred while connecting to the upstream service".to_string()
            } else {
                format!("Failed to send request: {}", e)
            };
            ApiError::bad_gateway(detail).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{matchers, Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_forwards_method_headers_and_body() {
        let fixture = TestFixture::new().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/orders"))
            .and(matchers::query_param("dry_run", "true"))
            .and(matchers::header("x-request-id", "r-1"))
            .and(matchers::body_json(json!({"item": "book"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("x-order-id", "42")
                    .set_body_json(json!({"id": 42})),
            )
            .expect(1)
            .mount(&fixture.upstream_mock)
            .await;

        let token = fixture.token(&[("orders", "read")]);
        let response = fixture
            .post_with_headers(
                "/orders?dry_run=true",
                &token,
                &json!({"item": "book"}),
                &[("x-request-id", "r-1")],
            )
            .await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json, json!({"id": 42}));
        assert_eq!(response.header("x-order-id").as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_upstream_timeout_is_bad_gateway() {
        let mut fixture = TestFixture::new().await;
        fixture.settings.request_timeout = 1;
        fixture.rebuild().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&fixture.upstream_mock)
            .await;

        let token = fixture.token(&[("orders", "read")]);
        let response = fixture.get("/orders", Some(&token)).await;

        response.assert_status(StatusCode::BAD_GATEWAY);
        assert!(response.json["detail"].as_str().unwrap().contains("timed out"));
    }
}
