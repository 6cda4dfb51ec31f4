use crate::cip::{string_values, ClaimError, ClaimInformationPointProvider, ClaimProviderFactory, Claims};
use crate::placeholders::{PlaceholderContext, Placeholders};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

const NAME: &str = "claims";

/// Claims whose values are literals or placeholders, e.g.
/// `{"tenant": "{request.header['X-Tenant']}"}`.
pub struct ClaimsProvider {
    definitions: Vec<(String, Vec<String>)>,
    placeholders: Placeholders,
}

#[async_trait]
impl ClaimInformationPointProvider for ClaimsProvider {
    async fn resolve(&self, context: &PlaceholderContext<'_>) -> Result<Claims, ClaimError> {
        let mut claims = Claims::new();
        for (name, expressions) in &self.definitions {
            let mut values = Vec::new();
            for expression in expressions {
                values.extend(self.placeholders.resolve(expression, context)?);
            }
            if !values.is_empty() {
                claims.insert(name.clone(), values);
            }
        }
        Ok(claims)
    }
}

pub struct ClaimsProviderFactory {
    placeholders: Placeholders,
}

impl ClaimsProviderFactory {
    pub fn new(placeholders: Placeholders) -> Self {
        Self { placeholders }
    }
}

impl ClaimProviderFactory for ClaimsProviderFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create(
        &self,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn ClaimInformationPointProvider>, ClaimError> {
        let definitions = config
            .iter()
            .map(|(name, value)| Ok((name.clone(), string_values(NAME, name, value)?)))
            .collect::<Result<Vec<_>, ClaimError>>()?;

        Ok(Arc::new(ClaimsProvider {
            definitions,
            placeholders: self.placeholders.clone(),
        }))
    }
}
