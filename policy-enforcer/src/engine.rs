//! The per-request authorization decision.
//!
//! [`PolicyEnforcer::enforce`] walks a request through path resolution, token
//! evaluation and, when the token falls short, a single permission negotiation
//! with the authorization server:
//!
//! ```text
//! START -> RESOLVE_PATH -> DISABLED
//!                       -> RESOLVE_TOKEN -> EVALUATE -> GRANT
//!                                                   -> NEGOTIATE -> RE_EVALUATE -> GRANT | DENY
//!                       -> CHALLENGE (anonymous caller)
//! ```

use crate::cip::{resolve_all, ClaimInformationPointProvider, ClaimRegistry, Claims};
use crate::client::authorization::{Authentication, JWT_CLAIM_TOKEN_FORMAT};
use crate::client::models::{AuthorizationRequest, PermissionRequest};
use crate::client::{AuthzClient, ClientConfig, ClientError};
use crate::config::{
    EnforcementMode, EnforcerConfig, MethodConfig, PathConfig, ScopeEnforcementMode,
};
use crate::context::AuthorizationContext;
use crate::error::EnforcerError;
use crate::paths::{configure_paths, PathMatcher, ResourceFinder};
use crate::placeholders::{PlaceholderContext, Placeholders};
use crate::request::RequestView;
use crate::token::{AccessToken, Permission};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::Method;
use log::{debug, info, warn};
use std::sync::Arc;

/// What the calling middleware should do with the request.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Let the request through
    Granted(AuthorizationContext),
    /// Answer forbidden, or redirect to the access denied page when one is configured
    Denied(AuthorizationContext),
    /// Answer 401 with this `WWW-Authenticate` value carrying a permission ticket
    Challenge { www_authenticate: String },
    /// No usable bearer token was presented
    AuthenticationRequired,
}

impl Verdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, Verdict::Granted(_))
    }

    fn deny() -> Self {
        Verdict::Denied(AuthorizationContext::denied())
    }
}

/// Policy enforcement point for one resource server.
///
/// Built once at startup and shared by all in-flight requests.
pub struct PolicyEnforcer {
    config: EnforcerConfig,
    client: AuthzClient,
    paths: PathMatcher,
    registry: ClaimRegistry,
    global_providers: Vec<Arc<dyn ClaimInformationPointProvider>>,
}

impl PolicyEnforcer {
    /// Discover the authorization server and resolve the configured paths.
    pub async fn new(config: EnforcerConfig) -> Result<Self, EnforcerError> {
        let client = AuthzClient::discover(ClientConfig::from(&config)).await?;
        let finder: Arc<dyn ResourceFinder> = Arc::new(client.clone());
        Self::with_parts(config, client, finder).await
    }

    /// Assemble an enforcer around an existing client and resource registry.
    pub async fn with_parts(
        mut config: EnforcerConfig,
        client: AuthzClient,
        finder: Arc<dyn ResourceFinder>,
    ) -> Result<Self, EnforcerError> {
        let registry = ClaimRegistry::new(client.http().clone(), Placeholders::default());
        if let Some(global) = config.claim_information_point.as_mut() {
            registry.validate(global);
        }
        for path in config.paths.iter_mut() {
            if let Some(cip) = path.claim_information_point.as_mut() {
                registry.validate(cip);
            }
        }
        let global_providers = match &config.claim_information_point {
            Some(global) => registry.build(global)?,
            None => Vec::new(),
        };

        let table = configure_paths(&config, finder.as_ref()).await;
        let paths = PathMatcher::new(
            table,
            &config.effective_path_cache(),
            config.remote_lookup_enabled(),
            finder,
        );

        info!(
            "Policy enforcer ready for resource '{}' in {:?} mode",
            config.resource, config.enforcement_mode
        );
        Ok(Self {
            config,
            client,
            paths,
            registry,
            global_providers,
        })
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    pub fn client(&self) -> &AuthzClient {
        &self.client
    }

    pub fn paths(&self) -> &PathMatcher {
        &self.paths
    }

    /// Decide whether `request`, made with the caller's raw bearer token, may proceed.
    ///
    /// Failures talking to the authorization server or a claim source deny the request.
    pub async fn enforce(&self, request: &RequestView, raw_token: Option<&str>) -> Verdict {
        debug!("Enforcing policy decisions for {} {}", request.method(), request.uri());
        let verdict = match self.authorize(request, raw_token).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Denying {} {}: {}", request.method(), request.uri(), e);
                Verdict::deny()
            }
        };

        match &verdict {
            Verdict::Granted(context) | Verdict::Denied(context) => debug!(
                "Policy enforcement result for {} is {} with {} permission(s)",
                request.uri(),
                if context.is_granted() { "GRANTED" } else { "DENIED" },
                context.permissions().len()
            ),
            Verdict::Challenge { .. } => debug!("Sending UMA challenge for {}", request.uri()),
            Verdict::AuthenticationRequired => {
                debug!("Authentication required for {}", request.uri())
            }
        }
        verdict
    }

    async fn authorize(
        &self,
        request: &RequestView,
        raw_token: Option<&str>,
    ) -> Result<Verdict, EnforcerError> {
        let decoded = raw_token.map(AccessToken::decode).transpose();

        if self.config.enforcement_mode == EnforcementMode::Disabled {
            return Ok(match raw_token {
                Some(_) => Verdict::Granted(AuthorizationContext::empty(true)),
                None => Verdict::AuthenticationRequired,
            });
        }

        // Denials redirect here, so the landing page itself is never enforced
        if self.is_access_denied_page(request) {
            let permissions = match &decoded {
                Ok(Some(token)) => token.permissions().to_vec(),
                _ => Vec::new(),
            };
            return Ok(Verdict::Granted(AuthorizationContext::granted(permissions, None)));
        }

        let path = self.paths.match_path(request.relative_path()).await;
        if let Some(path) = &path {
            if path.enforcement_mode == EnforcementMode::Disabled {
                debug!("Path {} is not enforced", path.path);
                return Ok(match decoded {
                    Ok(Some(token)) => granted(&token, path.clone()),
                    _ => Verdict::Granted(AuthorizationContext::empty(true)),
                });
            }
        }

        let token = match decoded {
            Ok(token) => token,
            Err(e) => {
                debug!("Rejecting malformed bearer token: {}", e);
                return Ok(Verdict::AuthenticationRequired);
            }
        };

        match (path, raw_token.zip(token)) {
            (None, Some((_, token))) => {
                if self.config.enforcement_mode == EnforcementMode::Permissive {
                    return Ok(Verdict::Granted(AuthorizationContext::granted(
                        token.permissions().to_vec(),
                        None,
                    )));
                }
                debug!("No configuration found for path {}", request.relative_path());
                Ok(Verdict::deny())
            }
            (None, None) => Ok(Verdict::deny()),
            (Some(path), Some((raw, token))) => self.check_permissions(request, path, raw, token).await,
            (Some(path), None) => self.anonymous(request, path).await,
        }
    }

    async fn check_permissions(
        &self,
        request: &RequestView,
        path: PathConfig,
        raw_token: &str,
        token: AccessToken,
    ) -> Result<Verdict, EnforcerError> {
        debug!("Checking permissions for {} against path {}", request.uri(), path.path);
        let method = self.required_scopes(&path, request);
        let context = PlaceholderContext::new(request).with_token(raw_token, &token);
        let claims = self.resolve_claims(&path, &context).await?;

        if self.is_authorized(&path, &method, &token, request, &claims).await {
            return Ok(granted(&token, path));
        }

        let Some(negotiated) = self
            .negotiate(request, raw_token, &token, &path, &method, &claims)
            .await?
        else {
            return Ok(tail(&method));
        };

        let token = token.with_permissions(negotiated.permissions());
        if self.is_authorized(&path, &method, &token, request, &claims).await {
            return Ok(granted(&token, path));
        }
        Ok(tail(&method))
    }

    async fn anonymous(&self, request: &RequestView, path: PathConfig) -> Result<Verdict, EnforcerError> {
        if !self.is_bearer_request(request) || !self.config.user_managed_access {
            return Ok(Verdict::deny());
        }

        let method = self.required_scopes(&path, request);
        let ticket = match self.permission_ticket(request, &path, &method).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!("Could not obtain a permission ticket for {}: {}", path.path, e);
                return Ok(Verdict::deny());
            }
        };

        Ok(Verdict::Challenge {
            www_authenticate: format!(
                "UMA realm=\"{}\",as_uri=\"{}\",ticket=\"{}\"",
                self.config.realm,
                self.client.server_configuration().issuer,
                ticket
            ),
        })
    }

    async fn permission_ticket(
        &self,
        request: &RequestView,
        path: &PathConfig,
        method: &MethodConfig,
    ) -> Result<String, EnforcerError> {
        let claims = self
            .resolve_claims(path, &PlaceholderContext::new(request))
            .await?;
        let mut permission = PermissionRequest::new(path.id.as_deref(), &method.scopes);
        if !claims.is_empty() {
            permission.claims = Some(claims);
        }
        Ok(self.client.create_permission_ticket(&[permission]).await?)
    }

    /// Exchange the caller's token for one carrying the permission this request needs.
    ///
    /// `None` means the authorization server refused.
    async fn negotiate(
        &self,
        request: &RequestView,
        raw_token: &str,
        token: &AccessToken,
        path: &PathConfig,
        method: &MethodConfig,
        claims: &Claims,
    ) -> Result<Option<AccessToken>, EnforcerError> {
        if self.config.user_managed_access {
            return Ok(None);
        }

        let mut authorization = AuthorizationRequest::default();
        authorization.add_permission(path.id.as_deref(), &method.scopes);
        if !claims.is_empty() {
            authorization.claim_token_format = Some(JWT_CLAIM_TOKEN_FORMAT.to_string());
            authorization.claim_token = Some(STANDARD.encode(serde_json::to_vec(claims)?));
        }
        if token.authorization.is_some() {
            authorization.rpt = Some(raw_token.to_string());
        }

        let authentication = if self.is_bearer_request(request) {
            authorization.subject_token = Some(raw_token.to_string());
            Authentication::ResourceServer
        } else {
            Authentication::Bearer(raw_token)
        };

        debug!("Obtaining authorization for {} {}", request.method(), path.path);
        match self.client.authorize(&authorization, authentication).await {
            Ok(response) => Ok(Some(AccessToken::decode(&response.access_token)?)),
            Err(ClientError::Denied(reason)) => {
                debug!("Authorization denied for {}: {}", path.path, reason);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn is_authorized(
        &self,
        path: &PathConfig,
        method: &MethodConfig,
        token: &AccessToken,
        request: &RequestView,
        claims: &Claims,
    ) -> bool {
        if token.authorization.is_none() {
            return false;
        }

        let mut resource_matched = false;
        for permission in token.permissions() {
            if permission.resource_id.is_none() {
                if has_scope_permission(method, permission) {
                    return true;
                }
                continue;
            }
            if !is_resource_permission(path, permission) {
                continue;
            }
            resource_matched = true;

            if has_scope_permission(method, permission) && has_valid_claims(permission, claims) {
                if request.method() == Method::DELETE && path.is_instance() {
                    self.paths.remove_from_cache(request.relative_path()).await;
                }
                debug!("Authorization GRANTED for path {}", path.path);
                return true;
            }
        }

        if !resource_matched && path.enforcement_mode == EnforcementMode::Permissive {
            return true;
        }
        debug!(
            "Authorization FAILED for path {}, {} permission(s) not enough",
            path.path,
            token.permissions().len()
        );
        false
    }

    /// Scopes the request method needs on `path`.
    fn required_scopes(&self, path: &PathConfig, request: &RequestView) -> MethodConfig {
        let method = request.method().as_str();
        if let Some(config) = path.methods.iter().find(|config| config.method == method) {
            return config.clone();
        }
        MethodConfig {
            method: method.to_string(),
            scopes: if self.config.http_method_as_scope {
                vec![method.to_string()]
            } else {
                path.scopes.clone()
            },
            scopes_enforcement_mode: ScopeEnforcementMode::Any,
        }
    }

    /// Global claims overwritten by the path's own claims.
    async fn resolve_claims(
        &self,
        path: &PathConfig,
        context: &PlaceholderContext<'_>,
    ) -> Result<Claims, EnforcerError> {
        let mut providers = self.global_providers.clone();
        if let Some(cip) = &path.claim_information_point {
            providers.extend(self.registry.build(cip)?);
        }
        if providers.is_empty() {
            return Ok(Claims::new());
        }
        Ok(resolve_all(&providers, context).await?)
    }

    /// Only the landing path itself counts; its query string is ignored.
    fn is_access_denied_page(&self, request: &RequestView) -> bool {
        self.config
            .on_deny_redirect_to
            .as_deref()
            .and_then(|page| page.split(['?', '#']).next())
            .is_some_and(|page| request.relative_path() == page)
    }

    fn is_bearer_request(&self, request: &RequestView) -> bool {
        request.has_bearer_authorization() || self.config.bearer_only
    }
}

fn granted(token: &AccessToken, path: PathConfig) -> Verdict {
    Verdict::Granted(AuthorizationContext::granted(
        token.permissions().to_vec(),
        Some(path),
    ))
}

/// Outcome once the token and negotiation both fell short.
fn tail(method: &MethodConfig) -> Verdict {
    if method.scopes_enforcement_mode == ScopeEnforcementMode::Disabled {
        return Verdict::Granted(AuthorizationContext::empty(true));
    }
    Verdict::deny()
}

fn is_resource_permission(path: &PathConfig, permission: &Permission) -> bool {
    let id = permission.resource_id.as_deref();
    if id.is_some() && id == path.id.as_deref() {
        return true;
    }
    path.parent
        .as_ref()
        .is_some_and(|parent| id.is_some() && id == parent.id.as_deref())
}

/// An empty scope set on the permission grants every scope of its resource.
fn has_scope_permission(method: &MethodConfig, permission: &Permission) -> bool {
    if permission.scopes.is_empty() {
        return true;
    }
    let required = &method.scopes;
    match method.scopes_enforcement_mode {
        ScopeEnforcementMode::All => required.iter().all(|scope| permission.scopes.contains(scope)),
        ScopeEnforcementMode::Any => {
            required.is_empty() || required.iter().any(|scope| permission.scopes.contains(scope))
        }
        ScopeEnforcementMode::Disabled => required.is_empty(),
    }
}

/// Every claim constraint must be met by a non-empty subset of the request's values.
fn has_valid_claims(permission: &Permission, claims: &Claims) -> bool {
    let Some(constraints) = &permission.claims else {
        return true;
    };
    constraints.iter().all(|(name, allowed)| match claims.get(name) {
        Some(values) if !values.is_empty() => values.iter().all(|value| allowed.contains(value)),
        _ => false,
    })
}
