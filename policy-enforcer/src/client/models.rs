//! Wire representations exchanged with the authorization server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// UMA discovery document served at `.well-known/uma2-configuration`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfiguration {
    pub issuer: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
    #[serde(default)]
    pub resource_registration_endpoint: Option<String>,
    #[serde(default)]
    pub permission_endpoint: Option<String>,
    #[serde(default)]
    pub policy_endpoint: Option<String>,
}

/// A scope as listed on a resource; the server sends either names or objects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ScopeRepresentation {
    Name(String),
    Object { name: String },
}

impl ScopeRepresentation {
    pub fn name(&self) -> &str {
        match self {
            ScopeRepresentation::Name(name) => name,
            ScopeRepresentation::Object { name } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResourceRepresentation {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
    #[serde(default, alias = "scopes")]
    pub resource_scopes: Vec<ScopeRepresentation>,
    #[serde(default)]
    pub owner: Option<Value>,
}

impl ResourceRepresentation {
    pub fn scope_names(&self) -> Vec<String> {
        self.resource_scopes
            .iter()
            .map(|scope| scope.name().to_string())
            .collect()
    }
}

/// Resource and scopes requested in a permission ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<BTreeMap<String, Vec<String>>>,
}

impl PermissionRequest {
    pub fn new(resource_id: Option<&str>, scopes: &[String]) -> Self {
        Self {
            resource_id: resource_id.map(str::to_string),
            resource_scopes: scopes.to_vec(),
            claims: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionResponse {
    pub ticket: String,
}

/// Options shaping the token endpoint's answer to an UMA grant.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub include_resource_name: bool,
    pub limit: Option<u32>,
    pub response_mode: Option<String>,
}

/// Parameters of an UMA grant (`urn:ietf:params:oauth:grant-type:uma-ticket`).
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRequest {
    pub ticket: Option<String>,
    pub claim_token: Option<String>,
    pub claim_token_format: Option<String>,
    pub pct: Option<String>,
    pub rpt: Option<String>,
    pub scope: Option<String>,
    pub audience: Option<String>,
    pub subject_token: Option<String>,
    pub permissions: Vec<PermissionRequest>,
    pub metadata: Option<RequestMetadata>,
}

impl AuthorizationRequest {
    pub fn add_permission(&mut self, resource_id: Option<&str>, scopes: &[String]) {
        self.permissions
            .push(PermissionRequest::new(resource_id, scopes));
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub upgraded: Option<bool>,
}

/// Result of introspecting a requesting party token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenIntrospectionResponse {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub permissions: Vec<crate::token::Permission>,
    #[serde(flatten)]
    pub other_claims: Map<String, Value>,
}
