use crate::cip::{string_values, ClaimError, ClaimInformationPointProvider, ClaimProviderFactory, Claims};
use crate::placeholders::{json_values, json_values_at, PlaceholderContext, Placeholders};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use std::sync::Arc;

const NAME: &str = "http";

/// Claims fetched from an external JSON service.
///
/// Settings: `url` (required), `method` (`GET` or `POST`), `headers` and
/// `parameters` whose values may use placeholders, and `claims` mapping claim
/// names to JSON pointers into the response. Without `claims` every top-level
/// field of the response becomes a claim.
pub struct HttpProvider {
    client: Client,
    placeholders: Placeholders,
    url: String,
    method: Method,
    headers: Vec<(String, Vec<String>)>,
    parameters: Vec<(String, Vec<String>)>,
    claims: Option<Vec<(String, Vec<String>)>>,
}

impl HttpProvider {
    fn expand(
        &self,
        definitions: &[(String, Vec<String>)],
        context: &PlaceholderContext<'_>,
    ) -> Result<Vec<(String, String)>, ClaimError> {
        let mut pairs = Vec::new();
        for (name, expressions) in definitions {
            for expression in expressions {
                for value in self.placeholders.resolve(expression, context)? {
                    pairs.push((name.clone(), value));
                }
            }
        }
        Ok(pairs)
    }
}

#[async_trait]
impl ClaimInformationPointProvider for HttpProvider {
    async fn resolve(&self, context: &PlaceholderContext<'_>) -> Result<Claims, ClaimError> {
        let parameters = self.expand(&self.parameters, context)?;
        let headers = self.expand(&self.headers, context)?;

        let mut builder = self.client.request(self.method.clone(), &self.url);
        builder = if self.method == Method::GET {
            builder.query(&parameters)
        } else {
            builder.form(&parameters)
        };
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!("Requesting claims from {} {}", self.method, self.url);
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Claim information point {} answered HTTP {}", self.url, status);
            return Err(ClaimError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let json: Value = response.json().await?;

        let mut claims = Claims::new();
        match &self.claims {
            Some(definitions) => {
                for (name, pointers) in definitions {
                    let values = pointers
                        .iter()
                        .flat_map(|pointer| json_values_at(&json, pointer))
                        .collect();
                    claims.insert(name.clone(), values);
                }
            }
            None => {
                if let Value::Object(fields) = &json {
                    for (name, value) in fields {
                        claims.insert(name.clone(), json_values(value));
                    }
                }
            }
        }
        Ok(claims)
    }
}

pub struct HttpProviderFactory {
    client: Client,
    placeholders: Placeholders,
}

impl HttpProviderFactory {
    pub fn new(client: Client, placeholders: Placeholders) -> Self {
        Self {
            client,
            placeholders,
        }
    }
}

fn definitions(
    config: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<(String, Vec<String>)>>, ClaimError> {
    let Some(section) = config.get(key) else {
        return Ok(None);
    };
    let Value::Object(entries) = section else {
        return Err(ClaimError::InvalidConfig(NAME, format!("'{}' must be an object", key)));
    };
    entries
        .iter()
        .map(|(name, value)| Ok((name.clone(), string_values(NAME, name, value)?)))
        .collect::<Result<Vec<_>, ClaimError>>()
        .map(Some)
}

impl ClaimProviderFactory for HttpProviderFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create(
        &self,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn ClaimInformationPointProvider>, ClaimError> {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ClaimError::InvalidConfig(NAME, "missing 'url'".to_string()))?;
        url::Url::parse(url)
            .map_err(|e| ClaimError::InvalidConfig(NAME, format!("invalid 'url': {}", e)))?;

        let method = match config.get("method").and_then(Value::as_str) {
            None => Method::GET,
            Some(m) if m.eq_ignore_ascii_case("GET") => Method::GET,
            Some(m) if m.eq_ignore_ascii_case("POST") => Method::POST,
            Some(other) => {
                return Err(ClaimError::InvalidConfig(
                    NAME,
                    format!("unsupported method '{}'", other),
                ));
            }
        };

        Ok(Arc::new(HttpProvider {
            client: self.client.clone(),
            placeholders: self.placeholders.clone(),
            url: url.to_string(),
            method,
            headers: definitions(config, "headers")?.unwrap_or_default(),
            parameters: definitions(config, "parameters")?.unwrap_or_default(),
            claims: definitions(config, "claims")?,
        }))
    }
}
