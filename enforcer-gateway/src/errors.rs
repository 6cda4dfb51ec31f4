use axum::response::IntoResponse;
use axum::Json;
use http::header::{LOCATION, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub status_code: StatusCode,
    /// `WWW-Authenticate` or `Location` header sent with the error
    pub header: Option<(http::HeaderName, HeaderValue)>,
}

impl ApiError {
    /// Create a new ApiError with a detail message and status code
    pub fn new<S: ToString>(detail: S, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            status_code,
            header: None,
        }
    }

    /// Forbidden (403)
    pub fn forbidden() -> Self {
        Self::new("Access denied", StatusCode::FORBIDDEN)
    }

    /// Found (302) pointing at the access denied page
    pub fn redirect(location: &str) -> Self {
        Self::new("Access denied", StatusCode::FOUND).with_header(LOCATION, location)
    }

    /// Unauthorized (401) carrying a `WWW-Authenticate` challenge
    pub fn unauthorized(challenge: &str) -> Self {
        Self::new("Authentication required", StatusCode::UNAUTHORIZED)
            .with_header(WWW_AUTHENTICATE, challenge)
    }

    /// Payload Too Large (413)
    pub fn payload_too_large<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::PAYLOAD_TOO_LARGE)
    }

    /// Bad Gateway (502)
    pub fn bad_gateway<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_GATEWAY)
    }

    fn with_header(mut self, name: http::HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => self.header = Some((name, value)),
            Err(e) => log::error!("Dropping invalid {} header value: {}", name, e),
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "detail": self.detail,
        });
        let mut response = (self.status_code, Json(body)).into_response();
        if let Some((name, value)) = self.header {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_sets_location() {
        let response = ApiError::redirect("/access-denied").into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/access-denied");
    }

    #[test]
    fn test_invalid_header_value_is_dropped() {
        let response = ApiError::unauthorized("bad\nvalue").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
