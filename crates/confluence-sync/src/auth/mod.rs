//! # Authentication
//!
//! Credentials for both sides of the sync, one strategy per configured mode.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Auth Strategies                                  │
//! │                                                                         │
//! │  ConfluenceAuth                        UniqueAuth                       │
//! │  ├── OAuth2LoAuth                      ├── ClusterLocalAuth             │
//! │  │   cloud: JSON → api.atlassian.com   │   x-service-id + extra headers │
//! │  │   dc:    form → {base}/rest/oauth2  │                                │
//! │  └── PatAuth (static, data-center)     └── ZitadelAuth                  │
//! │                                            Basic → Bearer               │
//! │                                                                         │
//! │  Token-based strategies share one TokenCache each:                     │
//! │  5-minute expiry buffer, one refresh in flight at a time.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod confluence;
pub mod token_cache;
pub mod unique;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfluenceAuthConfig, ConfluenceConfig, UniqueAuthConfig, UniqueConfig};
use crate::error::SyncResult;

pub use confluence::{OAuth2LoAuth, PatAuth};
pub use token_cache::{TokenCache, TokenResult};
pub use unique::{ClusterLocalAuth, ZitadelAuth};

/// Supplies a bearer token for Confluence requests.
#[async_trait]
pub trait ConfluenceAuth: Send + Sync {
    async fn access_token(&self) -> SyncResult<String>;
}

/// Supplies the headers that authenticate a Unique request.
#[async_trait]
pub trait UniqueAuth: Send + Sync {
    async fn headers(&self) -> SyncResult<Vec<(String, String)>>;
}

/// Builds the Confluence strategy for a tenant's configured mode.
pub fn confluence_auth(config: &ConfluenceConfig, client: reqwest::Client) -> Arc<dyn ConfluenceAuth> {
    match &config.auth {
        ConfluenceAuthConfig::OAuth2Lo {
            client_id,
            client_secret,
        } => Arc::new(OAuth2LoAuth::new(
            config.instance_type,
            &config.base_url,
            client_id,
            client_secret,
            client,
        )),
        ConfluenceAuthConfig::Pat { token } => Arc::new(PatAuth::new(token)),
    }
}

/// Builds the Unique strategy for a tenant's configured mode.
pub fn unique_auth(config: &UniqueConfig, client: reqwest::Client) -> Arc<dyn UniqueAuth> {
    match &config.auth {
        UniqueAuthConfig::ClusterLocal {
            service_extra_headers,
        } => Arc::new(ClusterLocalAuth::new(service_extra_headers)),
        UniqueAuthConfig::External {
            zitadel_oauth_token_url,
            zitadel_project_id,
            zitadel_client_id,
            zitadel_client_secret,
        } => Arc::new(ZitadelAuth::new(
            zitadel_oauth_token_url,
            zitadel_project_id,
            zitadel_client_id,
            zitadel_client_secret,
            client,
        )),
    }
}

/// Reads a token endpoint response, mapping failures to `TokenAcquisition`.
pub(crate) async fn read_token_response(
    endpoint: &str,
    response: reqwest::Response,
) -> SyncResult<TokenResult> {
    use crate::error::SyncError;

    #[derive(serde::Deserialize)]
    struct TokenResponse {
        access_token: Option<String>,
        expires_in: Option<f64>,
    }

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        let message = if status.as_u16() == 401 || status.as_u16() == 403 {
            format!(
                "Invalid credentials: {} responded with {}: {}",
                endpoint,
                status.as_u16(),
                body
            )
        } else {
            format!(
                "Token request to {} failed with status {}: {}",
                endpoint,
                status.as_u16(),
                body
            )
        };
        return Err(SyncError::TokenAcquisition(message));
    }

    let parsed: TokenResponse = response.json().await.map_err(|_| {
        SyncError::TokenAcquisition(format!(
            "Malformed response from {}: body is not valid JSON",
            endpoint
        ))
    })?;

    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            SyncError::TokenAcquisition("Invalid token response: missing access_token".to_string())
        })?;

    let expires_in = match parsed.expires_in {
        Some(secs) if secs.is_finite() && secs > 0.0 => secs as i64,
        other => {
            return Err(SyncError::TokenAcquisition(format!(
                "Invalid token response: expires_in must be a positive number, got {:?}",
                other
            )))
        }
    };

    Ok(TokenResult::expiring_in(access_token, expires_in))
}
