//! # Ingestion Service
//!
//! Moves page bodies and linked files into Unique, and removes content whose
//! source disappeared.
//!
//! ## Upload Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Register → Upload → Finalize                         │
//! │                                                                         │
//! │  1. ensure_space_scope(space_key)           ──► scope id                │
//! │                                                                         │
//! │  2. register_content(key, mime, size, …)    ──► { writeUrl, readUrl }   │
//! │        key = {tenant}/{space}/{page}                                    │
//! │              {tenant}/{space}/{page}_{file}                             │
//! │                                                                         │
//! │  3. PUT writeUrl                                                        │
//! │        x-ms-blob-type: BlockBlob                                        │
//! │        page: body bytes   file: streamed from Confluence (GET)          │
//! │                                                                         │
//! │  4. finalize_ingestion(fileUrl = readUrl)                               │
//! │                                                                         │
//! │  Any failure is logged for that item; the run keeps going.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deletion
//! Deleted keys are resolved to content ids with one lookup, then removed in
//! batches of [`DELETE_BATCH_SIZE`].

use std::sync::Arc;

use confluence_core::keys::{file_diff_key, ingestion_key, page_diff_key};
use confluence_core::links::{file_name_from_url, mime_type_for};
use confluence_core::{FetchedPage, OWNER_TYPE, SOURCE_OWNER_TYPE};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::json;
use tracing::{debug, error, info, warn, Instrument};

use crate::auth::ConfluenceAuth;
use crate::config::{ConfluenceConfig, UniqueConfig};
use crate::error::{sanitize, SyncError, SyncResult};
use crate::http::RateLimitedHttpClient;
use crate::scope::ScopeManagementService;
use crate::tenant;
use crate::unique::{ContentRegistration, UniqueFiles, UniqueIngestion};

// =============================================================================
// Constants
// =============================================================================

/// Content ids per delete call.
pub const DELETE_BATCH_SIZE: usize = 20;

/// Blob type header required by the upload target.
const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";
const BLOB_TYPE: &str = "BlockBlob";

const PAGE_MIME_TYPE: &str = "text/html";

// =============================================================================
// Ingestion Service
// =============================================================================

pub struct IngestionService {
    /// Unique ingestion API (register, finalize).
    unique: Arc<dyn UniqueIngestion>,

    /// Unique content lookup and deletion.
    files: Arc<dyn UniqueFiles>,

    scopes: Arc<ScopeManagementService>,

    /// Rate-limited Confluence client, used to read linked files.
    confluence_http: Arc<RateLimitedHttpClient>,

    confluence_auth: Arc<dyn ConfluenceAuth>,

    /// Plain client for blob uploads.
    upload_client: reqwest::Client,

    tenant_name: String,
    source_kind: &'static str,
    base_url: String,
    ingestion_config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl IngestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        unique: Arc<dyn UniqueIngestion>,
        files: Arc<dyn UniqueFiles>,
        scopes: Arc<ScopeManagementService>,
        confluence_http: Arc<RateLimitedHttpClient>,
        confluence_auth: Arc<dyn ConfluenceAuth>,
        upload_client: reqwest::Client,
        tenant_name: impl Into<String>,
        confluence: &ConfluenceConfig,
        unique_config: &UniqueConfig,
    ) -> Self {
        Self {
            unique,
            files,
            scopes,
            confluence_http,
            confluence_auth,
            upload_client,
            tenant_name: tenant_name.into(),
            source_kind: confluence.instance_type.source_kind(),
            base_url: confluence.base_url.clone(),
            ingestion_config: unique_config.ingestion_config.clone(),
        }
    }

    // =========================================================================
    // Pages
    // =========================================================================

    /// Ingests one page body. Failures are logged, never returned.
    pub async fn ingest_page(&self, page: &FetchedPage) {
        if page.body.is_empty() {
            info!(page_id = %page.id, title = %page.title, "Page has no body, skipping ingestion");
            return;
        }

        let result = self
            .try_ingest_page(page)
            .instrument(tenant::service_span::<Self>())
            .await;
        if let Err(e) = result {
            error!(
                page_id = %page.id,
                title = %page.title,
                error = %sanitize(&e.to_string()),
                "Failed to ingest page"
            );
        }
    }

    async fn try_ingest_page(&self, page: &FetchedPage) -> SyncResult<()> {
        let scope_id = self.scopes.ensure_space_scope(&page.space_key).await?;
        let bytes = page.body.clone().into_bytes();

        let registration = self.registration(
            ingestion_key(&self.tenant_name, &page_diff_key(&page.space_key, &page.id)),
            page.title.clone(),
            PAGE_MIME_TYPE,
            &page.web_url,
            scope_id,
            bytes.len() as u64,
            self.metadata(page),
        );

        let registered = self.unique.register_content(&registration).await?;
        self.upload(
            &registered.write_url,
            PAGE_MIME_TYPE,
            Some(bytes.len() as u64),
            reqwest::Body::from(bytes),
        )
        .await?;
        let content_id = self
            .unique
            .finalize_ingestion(&registration, &registered.read_url)
            .await?;

        debug!(page_id = %page.id, content_id = %content_id, "Page ingested");
        Ok(())
    }

    // =========================================================================
    // Linked Files
    // =========================================================================

    /// Ingests files linked from `page`. Each file is handled on its own.
    pub async fn ingest_files(&self, page: &FetchedPage, urls: &[String]) {
        for url in urls {
            let result = self
                .try_ingest_file(page, url)
                .instrument(tenant::service_span::<Self>())
                .await;
            if let Err(e) = result {
                error!(
                    page_id = %page.id,
                    url = %url,
                    error = %sanitize(&e.to_string()),
                    "Failed to ingest linked file"
                );
            }
        }
    }

    async fn try_ingest_file(&self, page: &FetchedPage, url: &str) -> SyncResult<()> {
        let file_name = file_name_from_url(url)
            .ok_or_else(|| SyncError::InvalidResponse(format!("No file name in {}", url)))?;
        let mime_type = mime_type_for(&file_name);
        let bearer = format!("Bearer {}", self.confluence_auth.access_token().await?);

        let byte_size = self.probe_size(url, &bearer).await;
        let scope_id = self.scopes.ensure_space_scope(&page.space_key).await?;

        let mut metadata = self.metadata(page);
        metadata["pageId"] = json!(page.id);

        let registration = self.registration(
            ingestion_key(
                &self.tenant_name,
                &file_diff_key(&page.space_key, &page.id, &file_name),
            ),
            file_name.clone(),
            mime_type,
            url,
            scope_id,
            byte_size,
            metadata,
        );
        let registered = self.unique.register_content(&registration).await?;

        let source = self
            .confluence_http
            .send_streaming(url, |client| client.get(url).header(AUTHORIZATION, bearer.as_str()))
            .await?;
        let known_size = (byte_size > 0).then_some(byte_size);
        self.upload(
            &registered.write_url,
            mime_type,
            known_size,
            reqwest::Body::wrap_stream(source.bytes_stream()),
        )
        .await?;

        self.unique
            .finalize_ingestion(&registration, &registered.read_url)
            .await?;
        debug!(page_id = %page.id, file_name = %file_name, "Linked file ingested");
        Ok(())
    }

    /// Content-Length from a HEAD request, or 0 when unavailable.
    async fn probe_size(&self, url: &str, bearer: &str) -> u64 {
        let response = self
            .confluence_http
            .send(url, |client| client.head(url).header(AUTHORIZATION, bearer))
            .await;
        match response {
            Ok(response) => response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            Err(e) => {
                warn!(url, error = %sanitize(&e.to_string()), "Could not determine file size");
                0
            }
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Removes the content stored under `keys`. Errors are logged.
    pub async fn delete_content(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        async {
            let nodes = match self.files.get_by_keys(keys).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    error!(keys = keys.len(), error = %sanitize(&e.to_string()), "Failed to look up content for deletion");
                    return;
                }
            };

            if nodes.is_empty() {
                info!(keys = keys.len(), "No ingested content found for deleted keys");
                return;
            }

            let ids: Vec<String> = nodes.into_iter().map(|n| n.id).collect();
            let mut deleted = 0usize;
            for batch in ids.chunks(DELETE_BATCH_SIZE) {
                match self.files.delete_by_ids(batch).await {
                    Ok(count) => deleted += count,
                    Err(e) => {
                        error!(batch = batch.len(), error = %sanitize(&e.to_string()), "Failed to delete content batch");
                    }
                }
            }

            info!(requested = keys.len(), found = ids.len(), deleted, "Deleted content");
        }
        .instrument(tenant::service_span::<Self>())
        .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn metadata(&self, page: &FetchedPage) -> serde_json::Value {
        json!({
            "confluenceLabels": page.confluence_labels(),
            "spaceKey": page.space_key,
            "spaceName": page.space_name,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn registration(
        &self,
        key: String,
        title: String,
        mime_type: &str,
        url: &str,
        scope_id: String,
        byte_size: u64,
        metadata: serde_json::Value,
    ) -> ContentRegistration {
        ContentRegistration {
            key,
            title,
            mime_type: mime_type.to_string(),
            owner_type: OWNER_TYPE.to_string(),
            scope_id,
            source_owner_type: SOURCE_OWNER_TYPE.to_string(),
            source_kind: self.source_kind.to_string(),
            source_name: self.base_url.clone(),
            url: Some(url.to_string()),
            base_url: Some(self.base_url.clone()),
            byte_size,
            metadata,
            store_internally: true,
            ingestion_config: self.ingestion_config.clone(),
        }
    }

    async fn upload(
        &self,
        write_url: &str,
        mime_type: &str,
        content_length: Option<u64>,
        body: reqwest::Body,
    ) -> SyncResult<()> {
        let mut request = self
            .upload_client
            .put(write_url)
            .header(CONTENT_TYPE, mime_type)
            .header(BLOB_TYPE_HEADER, BLOB_TYPE);
        if let Some(length) = content_length {
            request = request.header(CONTENT_LENGTH, length);
        }

        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Upload {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
