//! Confluence credentials: OAuth 2.0 two-legged client credentials or a
//! personal access token.

use async_trait::async_trait;
use confluence_core::InstanceType;
use futures::FutureExt;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, Instrument};

use super::token_cache::TokenCache;
use super::{read_token_response, ConfluenceAuth};
use crate::error::{sanitize, SyncResult};
use crate::tenant;

/// Atlassian identity endpoint shared by every cloud tenant.
pub const CLOUD_TOKEN_ENDPOINT: &str = "https://api.atlassian.com/oauth/token";

/// Data Center service accounts must request a scope explicitly.
const DC_TOKEN_SCOPE: &str = "READ";

// =============================================================================
// OAuth 2.0 (2LO)
// =============================================================================

/// Client-credentials grant against Atlassian identity or the DC server.
pub struct OAuth2LoAuth {
    client: reqwest::Client,
    instance_type: InstanceType,
    token_endpoint: String,
    client_id: String,
    client_secret: SecretString,
    cache: TokenCache,
}

impl OAuth2LoAuth {
    pub fn new(
        instance_type: InstanceType,
        base_url: &str,
        client_id: &str,
        client_secret: &SecretString,
        client: reqwest::Client,
    ) -> Self {
        let token_endpoint = match instance_type {
            InstanceType::Cloud => CLOUD_TOKEN_ENDPOINT.to_string(),
            InstanceType::DataCenter => format!("{}/rest/oauth2/latest/token", base_url),
        };
        Self {
            client,
            instance_type,
            token_endpoint,
            client_id: client_id.to_string(),
            client_secret: SecretString::from(client_secret.expose_secret().to_string()),
            cache: TokenCache::default(),
        }
    }

    /// Overrides the token endpoint.
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }
}

#[async_trait]
impl ConfluenceAuth for OAuth2LoAuth {
    async fn access_token(&self) -> SyncResult<String> {
        let client = self.client.clone();
        let endpoint = self.token_endpoint.clone();
        let instance_type = self.instance_type;
        let client_id = self.client_id.clone();
        let client_secret = self.client_secret.expose_secret().to_string();
        let span = tenant::service_span::<Self>();

        self.cache
            .get_token(move || {
                async move {
                    info!("Acquiring Confluence {} token via OAuth 2.0 2LO", instance_type);

                    let request = client.post(&endpoint);
                    let request = match instance_type {
                        InstanceType::Cloud => request.json(&serde_json::json!({
                            "grant_type": "client_credentials",
                            "client_id": client_id,
                            "client_secret": client_secret,
                        })),
                        InstanceType::DataCenter => request.form(&[
                            ("grant_type", "client_credentials"),
                            ("client_id", client_id.as_str()),
                            ("client_secret", client_secret.as_str()),
                            ("scope", DC_TOKEN_SCOPE),
                        ]),
                    };

                    let result = match request.send().await {
                        Ok(response) => read_token_response(&endpoint, response).await,
                        Err(e) => Err(crate::error::SyncError::TokenAcquisition(format!(
                            "Network error requesting token from {}: {}",
                            endpoint, e
                        ))),
                    };

                    if let Err(e) = &result {
                        error!(
                            error = %sanitize(&e.to_string()),
                            "Failed to acquire Confluence {} token via OAuth 2.0 2LO",
                            instance_type
                        );
                    }
                    result
                }
                .instrument(span)
                .boxed()
            })
            .await
    }
}

// =============================================================================
// Personal Access Token
// =============================================================================

/// Static token that never expires.
pub struct PatAuth {
    token: SecretString,
}

impl PatAuth {
    pub fn new(token: &SecretString) -> Self {
        Self {
            token: SecretString::from(token.expose_secret().to_string()),
        }
    }
}

#[async_trait]
impl ConfluenceAuth for PatAuth {
    async fn access_token(&self) -> SyncResult<String> {
        Ok(self.token.expose_secret().to_string())
    }
}
