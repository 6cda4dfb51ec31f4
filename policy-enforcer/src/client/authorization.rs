use crate::client::models::{AuthorizationRequest, TokenResponse};
use crate::client::{AuthzClient, ClientError};
use log::debug;

pub const UMA_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";
pub const JWT_CLAIM_TOKEN_FORMAT: &str = "urn:ietf:params:oauth:token-type:jwt";

/// Who an UMA grant is requested as.
#[derive(Debug, Clone, Copy)]
pub enum Authentication<'a> {
    /// The resource server's client credentials
    ResourceServer,
    /// The caller's own bearer token
    Bearer(&'a str),
}

impl AuthzClient {
    /// Exchange an UMA grant for a requesting party token.
    ///
    /// Any non-2xx answer from the token endpoint is an authorization denial.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        authentication: Authentication<'_>,
    ) -> Result<TokenResponse, ClientError> {
        if request.ticket.is_none() && request.permissions.is_empty() {
            return Err(ClientError::InvalidRequest(
                "an UMA grant needs a ticket or at least one permission".to_string(),
            ));
        }

        let mut form = uma_form(request, &self.config().resource);
        let builder = self.http().post(&self.server_configuration().token_endpoint);
        let builder = match authentication {
            Authentication::ResourceServer => self.config().authenticate(builder, &mut form),
            Authentication::Bearer(token) => builder.bearer_auth(token),
        };

        debug!(
            "Requesting authorization for {} permission(s)",
            request.permissions.len()
        );
        let response = builder.form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Authorization denied by server (HTTP {}): {}", status, body);
            return Err(ClientError::Denied(body));
        }
        Ok(response.json().await?)
    }
}

fn uma_form(request: &AuthorizationRequest, resource: &str) -> Vec<(&'static str, String)> {
    let mut form = vec![("grant_type", UMA_GRANT_TYPE.to_string())];

    let optional = [
        ("ticket", &request.ticket),
        ("claim_token", &request.claim_token),
        ("claim_token_format", &request.claim_token_format),
        ("pct", &request.pct),
        ("rpt", &request.rpt),
        ("scope", &request.scope),
        ("subject_token", &request.subject_token),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            form.push((name, value.clone()));
        }
    }

    let audience = request.audience.as_deref().unwrap_or(resource);
    form.push(("audience", audience.to_string()));

    for permission in &request.permissions {
        let mut value = permission.resource_id.clone().unwrap_or_default();
        if !permission.resource_scopes.is_empty() {
            value.push('#');
            value.push_str(&permission.resource_scopes.join(","));
        }
        form.push(("permission", value));
    }

    if let Some(metadata) = &request.metadata {
        form.push((
            "response_include_resource_name",
            metadata.include_resource_name.to_string(),
        ));
        if let Some(limit) = metadata.limit {
            form.push(("response_permissions_limit", limit.to_string()));
        }
        if let Some(mode) = &metadata.response_mode {
            form.push(("response_mode", mode.clone()));
        }
    }

    form
}
