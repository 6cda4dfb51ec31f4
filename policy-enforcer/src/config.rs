use crate::client::models::ResourceRepresentation;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Claim information point configuration: provider name to provider settings.
pub type ClaimInformationPointConfig = BTreeMap<String, Map<String, Value>>;

/// How strictly requests are checked, globally or for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnforcementMode {
    /// Requests without a matching configuration or permission are let through
    #[serde(alias = "permissive")]
    Permissive,
    #[default]
    #[serde(alias = "enforcing")]
    Enforcing,
    /// No permission checks at all
    #[serde(alias = "disabled")]
    Disabled,
}

/// How the scopes required by a method are matched against a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScopeEnforcementMode {
    #[default]
    #[serde(alias = "all")]
    All,
    #[serde(alias = "any")]
    Any,
    #[serde(alias = "disabled")]
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct MethodConfig {
    pub method: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub scopes_enforcement_mode: ScopeEnforcementMode,
}

/// A protected path and the resource it maps to.
///
/// Configured paths are deserialized from the enforcer settings; the remaining
/// fields are runtime state owned by the path matcher.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PathConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    pub path: String,
    #[serde(default)]
    pub methods: Vec<MethodConfig>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub enforcement_mode: EnforcementMode,
    #[serde(default)]
    pub claim_information_point: Option<ClaimInformationPointConfig>,
    /// Static paths are never invalidated by cache expiry
    #[serde(skip)]
    pub is_static: bool,
    #[serde(skip)]
    pub invalidated: bool,
    /// Collection-level configuration when this config denotes one instance
    #[serde(skip)]
    pub parent: Option<Arc<PathConfig>>,
}

impl PathConfig {
    /// Build one config per URI registered for the resource.
    pub fn from_resource(resource: &ResourceRepresentation) -> Vec<PathConfig> {
        resource
            .uris
            .iter()
            .map(|uri| PathConfig {
                id: resource.id.clone(),
                name: resource.name.clone(),
                resource_type: resource.resource_type.clone(),
                path: uri.clone(),
                scopes: resource.scope_names(),
                ..Default::default()
            })
            .collect()
    }

    /// Create the config for one concrete instance of this collection path.
    pub fn instance(parent: Arc<PathConfig>, path: &str) -> PathConfig {
        PathConfig {
            id: parent.id.clone(),
            name: parent.name.clone(),
            resource_type: parent.resource_type.clone(),
            path: path.to_string(),
            methods: parent.methods.clone(),
            scopes: parent.scopes.clone(),
            enforcement_mode: parent.enforcement_mode,
            claim_information_point: parent.claim_information_point.clone(),
            is_static: parent.is_static,
            invalidated: false,
            parent: Some(parent),
        }
    }

    pub fn is_instance(&self) -> bool {
        self.parent.is_some()
    }

    /// Fold a duplicate declaration of the same path into this one.
    pub fn merge(&mut self, other: PathConfig) {
        for method in other.methods {
            if !self.methods.contains(&method) {
                self.methods.push(method);
            }
        }
        for scope in other.scopes {
            if !self.scopes.contains(&scope) {
                self.scopes.push(scope);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathCacheConfig {
    /// Upper bound on cached paths
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Entry lifespan in milliseconds; 0 disables caching, negative never expires
    #[serde(default = "default_lifespan")]
    pub lifespan: i64,
}

impl Default for PathCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            lifespan: default_lifespan(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub secret: Option<String>,
}

/// Resource owner credentials used instead of the client credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Everything the enforcer needs, constructed once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct EnforcerConfig {
    pub auth_server_url: String,
    pub realm: String,
    /// Client id of the resource server
    pub resource: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub service_account: Option<ServiceAccount>,
    #[serde(default)]
    pub enforcement_mode: EnforcementMode,
    #[serde(default)]
    pub paths: Vec<PathConfig>,
    #[serde(default)]
    pub path_cache: Option<PathCacheConfig>,
    #[serde(default)]
    pub lazy_load_paths: bool,
    #[serde(default)]
    pub on_deny_redirect_to: Option<String>,
    #[serde(default)]
    pub http_method_as_scope: bool,
    /// Answer unauthenticated requests with UMA permission tickets
    #[serde(default)]
    pub user_managed_access: bool,
    #[serde(default)]
    pub bearer_only: bool,
    #[serde(default)]
    pub claim_information_point: Option<ClaimInformationPointConfig>,
    /// Seconds a service token must still be valid for to be reused
    #[serde(default)]
    pub token_minimum_time_to_live: i64,
    /// Timeout in seconds for calls to the authorization server
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl EnforcerConfig {
    pub fn new(auth_server_url: &str, realm: &str, resource: &str) -> Self {
        Self {
            auth_server_url: auth_server_url.to_string(),
            realm: realm.to_string(),
            resource: resource.to_string(),
            credentials: Credentials::default(),
            service_account: None,
            enforcement_mode: EnforcementMode::default(),
            paths: Vec::new(),
            path_cache: None,
            lazy_load_paths: false,
            on_deny_redirect_to: None,
            http_method_as_scope: false,
            user_managed_access: false,
            bearer_only: false,
            claim_information_point: None,
            token_minimum_time_to_live: 0,
            request_timeout: default_request_timeout(),
        }
    }

    /// Cache settings in effect, whether or not they were configured.
    pub fn effective_path_cache(&self) -> PathCacheConfig {
        self.path_cache.clone().unwrap_or_default()
    }

    /// Remote resource lookups happen when paths load lazily or a cache is configured.
    pub fn remote_lookup_enabled(&self) -> bool {
        self.lazy_load_paths || self.path_cache.is_some()
    }
}

fn default_max_entries() -> u64 {
    1000
}

fn default_lifespan() -> i64 {
    30_000
}

fn default_request_timeout() -> u64 {
    10
}
