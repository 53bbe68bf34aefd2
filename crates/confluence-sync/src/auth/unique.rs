//! Unique credentials: static cluster-local headers or a Zitadel
//! client-credentials token.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use confluence_core::SERVICE_ID;
use futures::FutureExt;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, Instrument};

use super::token_cache::TokenCache;
use super::{read_token_response, UniqueAuth};
use crate::error::{sanitize, SyncError, SyncResult};
use crate::tenant;

// =============================================================================
// Cluster Local
// =============================================================================

/// Identifies the connector to in-cluster services by header.
pub struct ClusterLocalAuth {
    headers: Vec<(String, String)>,
}

impl ClusterLocalAuth {
    pub fn new(extra_headers: &BTreeMap<String, String>) -> Self {
        let mut headers = vec![("x-service-id".to_string(), SERVICE_ID.to_string())];
        headers.extend(extra_headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { headers }
    }
}

#[async_trait]
impl UniqueAuth for ClusterLocalAuth {
    async fn headers(&self) -> SyncResult<Vec<(String, String)>> {
        Ok(self.headers.clone())
    }
}

// =============================================================================
// Zitadel
// =============================================================================

/// Client-credentials grant against a Zitadel token endpoint.
pub struct ZitadelAuth {
    client: reqwest::Client,
    token_url: String,
    basic_auth: SecretString,
    scope: String,
    cache: TokenCache,
}

impl ZitadelAuth {
    pub fn new(
        token_url: &str,
        project_id: &SecretString,
        client_id: &str,
        client_secret: &SecretString,
        client: reqwest::Client,
    ) -> Self {
        let basic_auth = BASE64.encode(format!(
            "{}:{}",
            client_id,
            client_secret.expose_secret()
        ));
        let scope = format!(
            "openid profile email urn:zitadel:iam:user:resourceowner \
             urn:zitadel:iam:org:projects:roles urn:zitadel:iam:org:project:id:{}:aud",
            project_id.expose_secret()
        );
        Self {
            client,
            token_url: token_url.to_string(),
            basic_auth: SecretString::from(basic_auth),
            scope,
            cache: TokenCache::default(),
        }
    }
}

#[async_trait]
impl UniqueAuth for ZitadelAuth {
    async fn headers(&self) -> SyncResult<Vec<(String, String)>> {
        let client = self.client.clone();
        let token_url = self.token_url.clone();
        let basic_auth = self.basic_auth.expose_secret().to_string();
        let scope = self.scope.clone();
        let span = tenant::service_span::<Self>();

        let token = self
            .cache
            .get_token(move || {
                async move {
                    let sent = client
                        .post(&token_url)
                        .header("Authorization", format!("Basic {}", basic_auth))
                        .form(&[
                            ("scope", scope.as_str()),
                            ("grant_type", "client_credentials"),
                        ])
                        .send()
                        .await;

                    let result = match sent {
                        Ok(response) => read_token_response(&token_url, response).await,
                        Err(e) => Err(SyncError::TokenAcquisition(format!(
                            "Network error requesting token from {}: {}",
                            token_url, e
                        ))),
                    };

                    if let Err(e) = &result {
                        error!(
                            error = %sanitize(&e.to_string()),
                            "Failed to acquire Unique API token from Zitadel"
                        );
                    }
                    result
                }
                .instrument(span)
                .boxed()
            })
            .await?;

        Ok(vec![(
            "Authorization".to_string(),
            format!("Bearer {}", token),
        )])
    }
}
