use crate::client::models::TokenIntrospectionResponse;
use crate::client::{read_json, AuthzClient, ClientError};
use log::debug;

impl AuthzClient {
    /// Introspect a requesting party token with the resource server's credentials.
    pub async fn introspect_requesting_party_token(
        &self,
        rpt: &str,
    ) -> Result<TokenIntrospectionResponse, ClientError> {
        let endpoint = self.endpoint(
            &self.server_configuration().introspection_endpoint,
            "introspection_endpoint",
        )?;

        let mut form = vec![
            ("token_type_hint", "requesting_party_token".to_string()),
            ("token", rpt.to_string()),
        ];
        let builder = self.http().post(&endpoint);
        let builder = self.config().authenticate(builder, &mut form);

        debug!("Introspecting requesting party token");
        let response = builder.form(&form).send().await?;
        read_json(response).await
    }
}
