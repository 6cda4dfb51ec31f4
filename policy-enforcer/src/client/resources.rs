//! Queries against the resource registration endpoint

use crate::client::models::ResourceRepresentation;
use crate::client::{read_json, AuthzClient, ClientError};
use crate::paths::ResourceFinder;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;

/// Filters accepted by the resource registration endpoint.
#[derive(Debug, Clone, Default)]
pub struct ResourceQuery {
    pub id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub owner: Option<String>,
    pub resource_type: Option<String>,
    pub scope: Option<String>,
    pub matching_uri: bool,
    pub exact_name: bool,
    pub first: Option<i32>,
    pub max: Option<i32>,
}

impl ResourceQuery {
    fn to_pairs(&self, deep: bool) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let optional = [
            ("_id", &self.id),
            ("name", &self.name),
            ("uri", &self.uri),
            ("owner", &self.owner),
            ("type", &self.resource_type),
            ("scope", &self.scope),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                pairs.push((name, value.clone()));
            }
        }
        pairs.push(("matchingUri", self.matching_uri.to_string()));
        pairs.push(("exactName", self.exact_name.to_string()));
        pairs.push(("deep", deep.to_string()));
        if let Some(first) = self.first {
            pairs.push(("first", first.to_string()));
        }
        pairs.push(("max", self.max.unwrap_or(-1).to_string()));
        pairs
    }
}

impl AuthzClient {
    /// Ids of the resources matching the query.
    pub async fn find_resource_ids(&self, query: &ResourceQuery) -> Result<Vec<String>, ClientError> {
        self.query_resources(query, false).await
    }

    /// Full representations of the resources matching the query.
    pub async fn find_resources(
        &self,
        query: &ResourceQuery,
    ) -> Result<Vec<ResourceRepresentation>, ClientError> {
        self.query_resources(query, true).await
    }

    pub async fn find_resource_by_id(&self, id: &str) -> Result<ResourceRepresentation, ClientError> {
        let endpoint = self.resource_endpoint()?;
        let token = self.service_tokens().get_token().await?;
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), id);

        debug!("Fetching resource {}", id);
        let response = self.http().get(&url).bearer_auth(token).send().await?;
        read_json(response).await
    }

    /// The resource server's own resource with exactly this name.
    pub async fn find_resource_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ResourceRepresentation>, ClientError> {
        let query = ResourceQuery {
            name: Some(name.to_string()),
            owner: Some(self.config().resource.clone()),
            exact_name: true,
            ..Default::default()
        };
        Ok(self.find_resources(&query).await?.into_iter().next())
    }

    pub async fn find_resources_by_uri(
        &self,
        uri: &str,
    ) -> Result<Vec<ResourceRepresentation>, ClientError> {
        let query = ResourceQuery {
            uri: Some(uri.to_string()),
            ..Default::default()
        };
        self.find_resources(&query).await
    }

    /// Resources whose URI patterns match `uri`.
    pub async fn find_resources_by_matching_uri(
        &self,
        uri: &str,
    ) -> Result<Vec<ResourceRepresentation>, ClientError> {
        let query = ResourceQuery {
            uri: Some(uri.to_string()),
            matching_uri: true,
            ..Default::default()
        };
        self.find_resources(&query).await
    }

    pub async fn find_all_resource_ids(&self) -> Result<Vec<String>, ClientError> {
        self.find_resource_ids(&ResourceQuery::default()).await
    }

    async fn query_resources<R: DeserializeOwned>(
        &self,
        query: &ResourceQuery,
        deep: bool,
    ) -> Result<Vec<R>, ClientError> {
        let endpoint = self.resource_endpoint()?;
        let token = self.service_tokens().get_token().await?;

        debug!("Querying resources at {} with {:?}", endpoint, query);
        let response = self
            .http()
            .get(&endpoint)
            .bearer_auth(token)
            .query(&query.to_pairs(deep))
            .send()
            .await?;
        read_json(response).await
    }

    fn resource_endpoint(&self) -> Result<String, ClientError> {
        self.endpoint(
            &self.server_configuration().resource_registration_endpoint,
            "resource_registration_endpoint",
        )
    }
}

#[async_trait]
impl ResourceFinder for AuthzClient {
    async fn find_by_matching_uri(
        &self,
        uri: &str,
    ) -> Result<Vec<ResourceRepresentation>, ClientError> {
        self.find_resources_by_matching_uri(uri).await
    }

    async fn find_by_uri(&self, uri: &str) -> Result<Vec<ResourceRepresentation>, ClientError> {
        self.find_resources_by_uri(uri).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ResourceRepresentation>, ClientError> {
        self.find_resource_by_name(name).await
    }

    async fn find_by_id(&self, id: &str) -> Result<ResourceRepresentation, ClientError> {
        self.find_resource_by_id(id).await
    }

    async fn find_all_ids(&self) -> Result<Vec<String>, ClientError> {
        self.find_all_resource_ids().await
    }
}
