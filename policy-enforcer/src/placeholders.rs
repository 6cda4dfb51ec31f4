//! `{resolver.source['param']}` placeholders in claim configuration.
//!
//! A configured value such as `{request.header['X-Tenant']}` is resolved
//! against the current request. Values without placeholders are literals.

use crate::request::RequestView;
use crate::token::AccessToken;
use log::{error, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaceholderError {
    #[error("Invalid placeholder [{0}]: could not find resolver name")]
    MissingResolver(String),
    #[error("Invalid placeholder [{0}]: {1}")]
    InvalidSource(String, String),
}

/// What a placeholder can be resolved against.
#[derive(Clone, Copy)]
pub struct PlaceholderContext<'a> {
    pub request: &'a RequestView,
    pub raw_token: Option<&'a str>,
    pub token: Option<&'a AccessToken>,
}

impl<'a> PlaceholderContext<'a> {
    pub fn new(request: &'a RequestView) -> Self {
        Self {
            request,
            raw_token: None,
            token: None,
        }
    }

    pub fn with_token(mut self, raw_token: &'a str, token: &'a AccessToken) -> Self {
        self.raw_token = Some(raw_token);
        self.token = Some(token);
        self
    }
}

pub trait PlaceholderResolver: Send + Sync {
    /// Prefix selecting this resolver, e.g. `request`
    fn name(&self) -> &'static str;

    /// Resolve the part of the placeholder after the resolver name.
    fn resolve(
        &self,
        source: &str,
        context: &PlaceholderContext<'_>,
    ) -> Result<Vec<String>, PlaceholderError>;
}

#[derive(Clone)]
pub struct Placeholders {
    resolvers: HashMap<&'static str, Arc<dyn PlaceholderResolver>>,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self::empty()
            .with_resolver(RequestPlaceholderResolver)
            .with_resolver(TokenPlaceholderResolver)
    }
}

impl Placeholders {
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    pub fn with_resolver<R: PlaceholderResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolvers.insert(resolver.name(), Arc::new(resolver));
        self
    }

    /// Resolve every placeholder in `value`.
    ///
    /// A placeholder resolving to exactly one value is substituted in place.
    /// One resolving to none or several values short-circuits and those values
    /// are returned as they are. Placeholders of unknown resolvers are kept.
    pub fn resolve(
        &self,
        value: &str,
        context: &PlaceholderContext<'_>,
    ) -> Result<Vec<String>, PlaceholderError> {
        let mut resolved = value.to_string();

        for placeholder in find_placeholders(value) {
            let (resolver_name, source) = placeholder
                .split_once('.')
                .ok_or_else(|| PlaceholderError::MissingResolver(value.to_string()))?;

            let Some(resolver) = self.resolvers.get(resolver_name) else {
                warn!("No placeholder resolver named '{}'", resolver_name);
                continue;
            };

            let values = resolver.resolve(source, context)?;
            if values.len() != 1 {
                return Ok(values);
            }
            resolved = resolved.replace(&format!("{{{}}}", placeholder), &values[0]);
        }

        Ok(vec![resolved.trim().to_string()])
    }
}

/// Inner text of each `{...}` in `value`, left to right.
fn find_placeholders(value: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        if end > 0 {
            found.push(&after[..end]);
        }
        rest = &after[end + 1..];
    }
    found
}

/// Split `header['X-Name']` into `("header", Some("X-Name"))`.
fn split_source(source: &str) -> (&str, Option<&str>) {
    match source.split_once('[') {
        Some((name, param)) => {
            let param = param.trim_end_matches(']').trim_matches(|c: char| c == '\'' || c == '"');
            (name, Some(param))
        }
        None => (source, None),
    }
}

fn required_param<'a>(source: &str, param: Option<&'a str>) -> Result<&'a str, PlaceholderError> {
    param.filter(|p| !p.is_empty()).ok_or_else(|| {
        PlaceholderError::InvalidSource(source.to_string(), "missing parameter name".to_string())
    })
}

/// Flatten a JSON node into claim values. Objects are kept as JSON text.
pub(crate) fn json_values(value: &Value) -> Vec<String> {
    fn text(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        other => text(other).into_iter().collect(),
    }
}

pub(crate) fn json_values_at(value: &Value, pointer: &str) -> Vec<String> {
    value.pointer(pointer).map(json_values).unwrap_or_default()
}

/// Reads from the request: `parameter`, `header`, `cookie`, `remoteAddr`,
/// `method`, `uri`, `relativePath`, `secure` and `body`.
pub struct RequestPlaceholderResolver;

impl PlaceholderResolver for RequestPlaceholderResolver {
    fn name(&self) -> &'static str {
        "request"
    }

    fn resolve(
        &self,
        source: &str,
        context: &PlaceholderContext<'_>,
    ) -> Result<Vec<String>, PlaceholderError> {
        let request = context.request;
        let (name, param) = split_source(source);

        let values = match name {
            "parameter" => request
                .first_parameter(required_param(source, param)?)
                .map(str::to_string)
                .into_iter()
                .collect(),
            "header" => request.header_values(required_param(source, param)?),
            "cookie" => request
                .cookie(required_param(source, param)?)
                .into_iter()
                .collect(),
            "remoteAddr" => request
                .remote_addr()
                .map(|addr| addr.ip().to_string())
                .into_iter()
                .collect(),
            "method" => vec![request.method().to_string()],
            "uri" => vec![request.uri().to_string()],
            "relativePath" => vec![request.relative_path().to_string()],
            "secure" => vec![request.is_secure().to_string()],
            "body" => body_values(request, param),
            _ => {
                return Err(PlaceholderError::InvalidSource(
                    source.to_string(),
                    "unknown request source".to_string(),
                ));
            }
        };
        Ok(values)
    }
}

fn body_values(request: &RequestView, pointer: Option<&str>) -> Vec<String> {
    if !request.is_json() {
        return Vec::new();
    }
    let Some(body) = request.body() else {
        return Vec::new();
    };
    match serde_json::from_slice::<Value>(body) {
        Ok(json) => match pointer {
            Some(pointer) => json_values_at(&json, pointer),
            None => json_values(&json),
        },
        Err(e) => {
            error!("Failed to parse JSON request body: {}", e);
            Vec::new()
        }
    }
}

/// Reads from the caller's token: `access_token` or `access_token['/claim']`.
pub struct TokenPlaceholderResolver;

impl PlaceholderResolver for TokenPlaceholderResolver {
    fn name(&self) -> &'static str {
        "keycloak"
    }

    fn resolve(
        &self,
        source: &str,
        context: &PlaceholderContext<'_>,
    ) -> Result<Vec<String>, PlaceholderError> {
        match split_source(source) {
            ("access_token", None) => Ok(context.raw_token.map(str::to_string).into_iter().collect()),
            ("access_token", Some(pointer)) => Ok(context
                .token
                .and_then(|token| token.claim(pointer))
                .map(|claim| json_values(&claim))
                .unwrap_or_default()),
            _ => Err(PlaceholderError::InvalidSource(
                source.to_string(),
                "unknown token source".to_string(),
            )),
        }
    }
}
