//! Normalized view of an inbound request, as seen by the enforcer.

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Everything the enforcer may read from a request.
///
/// The body is buffered by the caller before evaluation so that placeholders
/// can read it and the downstream handler still receives it.
#[derive(Debug, Clone)]
pub struct RequestView {
    method: Method,
    uri: String,
    relative_path: String,
    query: HashMap<String, Vec<String>>,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    secure: bool,
    body: Option<Bytes>,
}

impl RequestView {
    /// Create a view from the method and the request target (path and query).
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        let relative_path = if path.is_empty() { "/" } else { path };

        let mut params: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                params
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }

        Self {
            method,
            uri: uri.to_string(),
            relative_path: relative_path.to_string(),
            query: params,
            headers: HeaderMap::new(),
            remote_addr: None,
            secure: false,
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full request target including the query string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn first_parameter(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of a header, in the order received.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }

    /// The credential of the first `Bearer` authorization header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get_all(AUTHORIZATION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| {
                let mut parts = value.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
                        Some(token)
                    }
                    _ => None,
                }
            })
    }

    pub fn has_bearer_authorization(&self) -> bool {
        self.bearer_token().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_query_and_path_split() {
        let request = RequestView::new(Method::GET, "/orders/42?tag=a&tag=b&q=x%20y");
        assert_eq!(request.relative_path(), "/orders/42");
        assert_eq!(request.uri(), "/orders/42?tag=a&tag=b&q=x%20y");
        assert_eq!(request.first_parameter("tag"), Some("a"));
        assert_eq!(request.first_parameter("q"), Some("x y"));
        assert_eq!(request.first_parameter("missing"), None);
    }

    #[test]
    fn test_cookies_and_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session=abc; theme=dark"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer token123"));
        let request = RequestView::new(Method::GET, "/").with_headers(headers);

        assert_eq!(request.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(request.cookie("other"), None);
        assert!(request.has_bearer_authorization());
        assert_eq!(request.bearer_token(), Some("token123"));
    }

    #[test]
    fn test_basic_authorization_is_not_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        let request = RequestView::new(Method::GET, "/").with_headers(headers);
        assert!(!request.has_bearer_authorization());
        assert_eq!(request.bearer_token(), None);
    }
}
