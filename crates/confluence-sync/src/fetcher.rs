//! # Content Fetcher
//!
//! Resolves the storage body of each page the diff marked as new or updated.
//! Pages are fetched one at a time; a page that disappeared, has no body or
//! does not answer within the step timeout is dropped from the run without
//! failing it. A dropped page is still new or updated on the next run.

use std::sync::Arc;
use std::time::Duration;

use confluence_core::labels::extract_labels;
use confluence_core::{DiscoveredPage, FetchedPage, PageMetadata};
use tracing::{error, info, warn, Instrument};

use crate::config::{ConfluenceConfig, ProcessingConfig};
use crate::confluence::ConfluenceApi;
use crate::error::sanitize;
use crate::tenant;

pub struct ContentFetcher {
    api: Arc<dyn ConfluenceApi>,
    ingest_single_label: String,
    ingest_all_label: String,

    /// Upper bound for fetching one page.
    page_timeout: Duration,
}

impl ContentFetcher {
    pub fn new(
        api: Arc<dyn ConfluenceApi>,
        confluence: &ConfluenceConfig,
        processing: &ProcessingConfig,
    ) -> Self {
        Self {
            api,
            ingest_single_label: confluence.ingest_single_label.clone(),
            ingest_all_label: confluence.ingest_all_label.clone(),
            page_timeout: Duration::from_secs(processing.step_timeout_seconds),
        }
    }

    /// Fetches bodies for `pages`, in order, skipping any that cannot be fetched.
    pub async fn fetch_pages_content(&self, pages: &[DiscoveredPage]) -> Vec<FetchedPage> {
        async {
            let mut fetched = Vec::with_capacity(pages.len());
            for page in pages {
                if let Some(content) = self.fetch_one(page).await {
                    fetched.push(content);
                }
            }

            info!(
                requested = pages.len(),
                fetched = fetched.len(),
                "Content fetching completed"
            );
            fetched
        }
        .instrument(tenant::service_span::<Self>())
        .await
    }

    async fn fetch_one(&self, page: &DiscoveredPage) -> Option<FetchedPage> {
        let result = tokio::time::timeout(self.page_timeout, self.api.get_page_by_id(&page.id)).await;
        let full = match result {
            Err(_) => {
                error!(
                    page_id = %page.id,
                    title = %page.title,
                    timeout_secs = self.page_timeout.as_secs(),
                    "Timed out fetching page"
                );
                return None;
            }
            Ok(Ok(Some(full))) => full,
            Ok(Ok(None)) => {
                warn!(page_id = %page.id, title = %page.title, "Page not found, possibly deleted");
                return None;
            }
            Ok(Err(e)) => {
                error!(
                    page_id = %page.id,
                    title = %page.title,
                    error = %sanitize(&e.to_string()),
                    "Failed to fetch page, possibly deleted in the meantime"
                );
                return None;
            }
        };

        let body = full.storage_body();
        if body.is_empty() {
            info!(page_id = %page.id, title = %page.title, "Page has no body, skipping");
            return None;
        }

        let labels = extract_labels(
            &full.label_names(),
            &self.ingest_single_label,
            &self.ingest_all_label,
        );
        let metadata = if labels.is_empty() {
            None
        } else {
            Some(PageMetadata {
                confluence_labels: labels,
            })
        };

        Some(FetchedPage {
            id: page.id.clone(),
            title: page.title.clone(),
            body: body.to_string(),
            web_url: page.web_url.clone(),
            space_id: page.space_id.clone(),
            space_key: page.space_key.clone(),
            space_name: page.space_name.clone(),
            metadata,
        })
    }
}
