//! # File Diff Service
//!
//! Submits the manifest of everything currently in Confluence and learns
//! what changed since the last run.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          File Diff                                      │
//! │                                                                         │
//! │  DiscoveredPage ──► { key: ENG/123, url: web_url, updatedAt: when }     │
//! │  linked file    ──► { key: ENG/123_plan.pdf, url: file url, … }         │
//! │                                                                         │
//! │  perform_file_diff(items, partialKey = tenant, sourceKind, baseUrl)    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  new / updated / moved / deleted  (diff keys)                           │
//! │        │                                                                │
//! │        ├── mass-deletion guard ──► MassDeletionGuard (run aborted)      │
//! │        ▼                                                                │
//! │  page ids per category, deleted keys as {tenant}/{diff key}            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard catches a scan that came back empty or truncated by an upstream
//! failure, which would otherwise wipe the tenant's content.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use confluence_core::keys::{file_diff_key, ingestion_key, page_diff_key, page_ids_from_keys};
use confluence_core::links::{extract_file_urls, file_name_from_url};
use confluence_core::{DiscoveredPage, FileDiffItem, FileDiffResult};
use tracing::{error, info, Instrument};

use crate::config::{ConfluenceConfig, IngestionConfig};
use crate::error::{SyncError, SyncResult};
use crate::tenant;
use crate::unique::{FileDiffResponse, UniqueIngestion};

pub struct FileDiffService {
    unique: Arc<dyn UniqueIngestion>,
    tenant_name: String,
    source_kind: &'static str,
    base_url: String,
    ingest_files: bool,
    allowed_file_extensions: Vec<String>,
}

impl FileDiffService {
    pub fn new(
        unique: Arc<dyn UniqueIngestion>,
        tenant_name: impl Into<String>,
        confluence: &ConfluenceConfig,
        ingestion: &IngestionConfig,
    ) -> Self {
        Self {
            unique,
            tenant_name: tenant_name.into(),
            source_kind: confluence.instance_type.source_kind(),
            base_url: confluence.base_url.clone(),
            ingest_files: ingestion.file_ingestion_enabled(),
            allowed_file_extensions: ingestion.allowed_file_extensions.clone(),
        }
    }

    /// Diffs `pages` (plus files linked from `bodies`, keyed by page id)
    /// against what Unique already holds.
    pub async fn compute_diff(
        &self,
        pages: &[DiscoveredPage],
        bodies: Option<&HashMap<String, String>>,
    ) -> SyncResult<FileDiffResult> {
        async {
            let items = self.build_manifest(pages, bodies);
            let response = self
                .unique
                .perform_file_diff(&items, &self.tenant_name, self.source_kind, &self.base_url)
                .await?;

            check_mass_deletion(items.len(), &response)?;

            info!(
                submitted = items.len(),
                new = response.new_files.len(),
                updated = response.updated_files.len(),
                moved = response.moved_files.len(),
                deleted = response.deleted_files.len(),
                "File diff completed"
            );

            Ok(FileDiffResult {
                new_page_ids: page_ids_from_keys(&response.new_files),
                updated_page_ids: page_ids_from_keys(&response.updated_files),
                deleted_page_ids: page_ids_from_keys(&response.deleted_files),
                moved_page_ids: page_ids_from_keys(&response.moved_files),
                deleted_keys: response
                    .deleted_files
                    .iter()
                    .map(|key| ingestion_key(&self.tenant_name, key))
                    .collect(),
            })
        }
        .instrument(tenant::service_span::<Self>())
        .await
    }

    fn build_manifest(
        &self,
        pages: &[DiscoveredPage],
        bodies: Option<&HashMap<String, String>>,
    ) -> Vec<FileDiffItem> {
        let mut items = Vec::with_capacity(pages.len());
        let mut keys = HashSet::new();

        for page in pages {
            let key = page_diff_key(&page.space_key, &page.id);
            if keys.insert(key.clone()) {
                items.push(FileDiffItem {
                    key,
                    url: page.web_url.clone(),
                    updated_at: page.version_timestamp.clone(),
                });
            }

            if !self.ingest_files {
                continue;
            }
            let Some(body) = bodies.and_then(|b| b.get(&page.id)) else {
                continue;
            };

            for url in extract_file_urls(body, &self.allowed_file_extensions, &self.base_url) {
                let Some(file_name) = file_name_from_url(&url) else {
                    continue;
                };
                let key = file_diff_key(&page.space_key, &page.id, &file_name);
                if keys.insert(key.clone()) {
                    items.push(FileDiffItem {
                        key,
                        url,
                        updated_at: page.version_timestamp.clone(),
                    });
                }
            }
        }

        items
    }
}

/// Refuses diffs that would delete content without anything to replace it.
fn check_mass_deletion(submitted: usize, response: &FileDiffResponse) -> SyncResult<()> {
    let deleted = response.deleted_files.len();
    if deleted == 0 {
        return Ok(());
    }

    let message = if submitted == 0 {
        format!(
            "Submitted 0 items to file diff but {} files would be deleted. Aborting sync.",
            deleted
        )
    } else if response.new_files.is_empty()
        && response.updated_files.is_empty()
        && deleted >= submitted
    {
        format!(
            "File diff would delete {} files with zero new or updated items. Aborting sync.",
            deleted
        )
    } else {
        return Ok(());
    };

    error!(submitted, deleted, "{}", message);
    Err(SyncError::MassDeletionGuard(message))
}
