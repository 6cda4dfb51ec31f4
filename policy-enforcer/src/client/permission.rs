use crate::client::models::{PermissionRequest, PermissionResponse};
use crate::client::{read_json, AuthzClient, ClientError};
use log::debug;

impl AuthzClient {
    /// Register the requested permissions and return the resulting ticket.
    pub async fn create_permission_ticket(
        &self,
        requests: &[PermissionRequest],
    ) -> Result<String, ClientError> {
        let endpoint = self.endpoint(
            &self.server_configuration().permission_endpoint,
            "permission_endpoint",
        )?;
        let token = self.service_tokens().get_token().await?;

        debug!("Creating permission ticket for {} permission(s)", requests.len());
        let response = self
            .http()
            .post(&endpoint)
            .bearer_auth(token)
            .json(requests)
            .send()
            .await?;

        let permission: PermissionResponse = read_json(response).await?;
        Ok(permission.ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{setup_logger, AuthServerFixture};
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::{matchers, Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_create_ticket() {
        setup_logger();
        let fixture = AuthServerFixture::start().await;
        fixture.mount_service_token().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path(fixture.permission_path()))
            .and(matchers::body_json(json!([
                {"resource_id": "orders", "resource_scopes": ["read"], "claims": {"dept": ["eng"]}}
            ])))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ticket": "t-123"})))
            .expect(1)
            .mount(&fixture.server)
            .await;

        let client = fixture.client().await;
        let mut request = PermissionRequest::new(Some("orders"), &["read".to_string()]);
        request.claims = Some(BTreeMap::from([("dept".to_string(), vec!["eng".to_string()])]));

        let ticket = client.create_permission_ticket(&[request]).await.unwrap();
        assert_eq!(ticket, "t-123");
    }

    #[tokio::test]
    async fn test_create_ticket_server_error() {
        setup_logger();
        let fixture = AuthServerFixture::start().await;
        fixture.mount_service_token().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path(fixture.permission_path()))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_resource_id"))
            .mount(&fixture.server)
            .await;

        let client = fixture.client().await;
        let request = PermissionRequest::new(Some("nope"), &[]);
        let result = client.create_permission_ticket(&[request]).await;
        assert!(matches!(result, Err(ClientError::Api { status: 400, .. })));
    }
}
