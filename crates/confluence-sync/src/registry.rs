//! # Composition Root
//!
//! Builds every tenant's clients and services once at startup.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Per-Tenant Object Graph                              │
//! │                                                                         │
//! │  NamedTenantConfig                                                      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  TenantClients::connect                                                 │
//! │    ├── RateLimitedHttpClient "confluence" (confluence rpm)              │
//! │    ├── RateLimitedHttpClient "unique"     (unique rpm)                  │
//! │    ├── ConfluenceAuth + ConfluenceApi (cloud | data-center)             │
//! │    └── UniqueAuth + UniqueApiClient                                     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  build_services ──► ServiceRegistry                                     │
//! │    PageScanner, ContentFetcher, FileDiffService,                        │
//! │    ScopeManagementService, IngestionService                             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  TenantContext ──► TenantRegistry (shared shutdown flag)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is shared between tenants except the shutdown flag, so one
//! tenant's token cache, rate limiter and scope cache never affect another.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::auth::{self, ConfluenceAuth};
use crate::config::{NamedTenantConfig, TenantConfig};
use crate::confluence::{confluence_api, ConfluenceApi};
use crate::error::SyncResult;
use crate::fetcher::ContentFetcher;
use crate::file_diff::FileDiffService;
use crate::http::{HttpClientConfig, RateLimitedHttpClient};
use crate::ingestion::IngestionService;
use crate::scanner::PageScanner;
use crate::scope::ScopeManagementService;
use crate::tenant::{ServiceRegistry, TenantContext, TenantRegistry};
use crate::unique::{UniqueApiClient, UniqueFiles, UniqueIngestion, UniqueScopes, UniqueUsers};

/// Outbound clients of one tenant.
pub struct TenantClients {
    pub confluence: Arc<dyn ConfluenceApi>,
    pub confluence_http: Arc<RateLimitedHttpClient>,
    pub confluence_auth: Arc<dyn ConfluenceAuth>,
    pub ingestion: Arc<dyn UniqueIngestion>,
    pub scopes: Arc<dyn UniqueScopes>,
    pub files: Arc<dyn UniqueFiles>,
    pub users: Arc<dyn UniqueUsers>,
    /// Plain client for blob uploads.
    pub upload_client: reqwest::Client,
}

impl TenantClients {
    /// Builds the real HTTP-backed clients for `config`.
    ///
    /// Requests wait at most one step timeout for a rate-limit permit.
    pub fn connect(config: &TenantConfig) -> SyncResult<Self> {
        let queue_timeout = Duration::from_secs(config.processing.step_timeout_seconds);

        let confluence_http = Arc::new(RateLimitedHttpClient::new(HttpClientConfig::new(
            "confluence",
            config.confluence.api_rate_limit_per_minute,
            queue_timeout,
        ))?);
        let unique_http = Arc::new(RateLimitedHttpClient::new(HttpClientConfig::new(
            "unique",
            config.unique.api_rate_limit_per_minute,
            queue_timeout,
        ))?);

        let confluence_auth =
            auth::confluence_auth(&config.confluence, confluence_http.inner().clone());
        let unique_auth = auth::unique_auth(&config.unique, unique_http.inner().clone());

        let confluence = confluence_api(
            &config.confluence,
            Arc::clone(&confluence_auth),
            Arc::clone(&confluence_http),
        );
        let unique = Arc::new(UniqueApiClient::new(
            unique_http,
            unique_auth,
            config.unique.ingestion_service_base_url.clone(),
            config.unique.scope_management_service_base_url.clone(),
        ));

        Ok(Self {
            confluence,
            confluence_http,
            confluence_auth,
            ingestion: unique.clone(),
            scopes: unique.clone(),
            files: unique.clone(),
            users: unique,
            upload_client: reqwest::Client::builder().build()?,
        })
    }
}

/// Wires the sync services of one tenant.
pub fn build_services(name: &str, config: &TenantConfig, clients: TenantClients) -> ServiceRegistry {
    let scopes = Arc::new(ScopeManagementService::new(
        clients.scopes,
        clients.users,
        name,
        config.ingestion.scope_id.clone(),
    ));

    let mut services = ServiceRegistry::new();
    services.register(Arc::new(PageScanner::new(
        Arc::clone(&clients.confluence),
        &config.confluence,
        &config.processing,
    )));
    services.register(Arc::new(ContentFetcher::new(
        Arc::clone(&clients.confluence),
        &config.confluence,
        &config.processing,
    )));
    services.register(Arc::new(FileDiffService::new(
        Arc::clone(&clients.ingestion),
        name,
        &config.confluence,
        &config.ingestion,
    )));
    services.register(Arc::new(IngestionService::new(
        clients.ingestion,
        clients.files,
        Arc::clone(&scopes),
        clients.confluence_http,
        clients.confluence_auth,
        clients.upload_client,
        name,
        &config.confluence,
        &config.unique,
    )));
    services.register(scopes);
    services
}

/// Builds one context per loaded tenant, all sharing one shutdown flag.
pub fn build_registry(configs: &[NamedTenantConfig]) -> SyncResult<TenantRegistry> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut tenants = Vec::with_capacity(configs.len());

    for named in configs {
        let clients = TenantClients::connect(&named.config)?;
        let services = build_services(&named.name, &named.config, clients);
        info!(
            tenant = %named.name,
            instance_type = %named.config.confluence.instance_type,
            confluence_auth = named.config.confluence.auth.mode_name(),
            services = services.len(),
            "Tenant services initialized"
        );
        tenants.push(Arc::new(TenantContext::new(
            named.name.clone(),
            Arc::clone(&named.config),
            services,
            Arc::clone(&shutdown),
        )));
    }

    Ok(TenantRegistry::new(tenants, shutdown))
}
