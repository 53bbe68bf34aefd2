//! # Page Scanner
//!
//! Finds every page that should be in Unique.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Page Discovery                                  │
//! │                                                                         │
//! │  search_pages_by_label()                                                │
//! │        │  label = ai-ingest OR ai-ingest-all                            │
//! │        ▼                                                                │
//! │  ┌──────────────────────────┐     carries ingest-all label?             │
//! │  │ filter skipped types     │────────────────┐                          │
//! │  │ dedupe by id             │                ▼                          │
//! │  │ stop at max_pages_to_scan│     ┌─────────────────────────┐           │
//! │  └────────────┬─────────────┘     │ expansion roots         │           │
//! │               │                   └────────────┬────────────┘           │
//! │               │                                │ one batched call       │
//! │               │                   get_descendant_pages(roots)           │
//! │               │                                │ same filter + dedupe   │
//! │               ▼                                ▼                        │
//! │        Vec<DiscoveredPage>  ◄───────────────────┘                       │
//! │                                                                         │
//! │  A descendant failure is logged and the labelled pages are kept.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use confluence_core::labels::has_label;
use confluence_core::{ContentType, DiscoveredPage};
use tracing::{info, warn, Instrument};

use crate::config::{ConfluenceConfig, ProcessingConfig};
use crate::confluence::{ConfluenceApi, ConfluencePage};
use crate::error::{sanitize, SyncResult};
use crate::tenant;

/// Discovers labelled pages and the descendants of ingest-all pages.
pub struct PageScanner {
    api: Arc<dyn ConfluenceApi>,
    ingest_all_label: String,
    max_pages_to_scan: Option<usize>,
}

/// Accumulates discovered pages while enforcing dedupe and the scan cap.
struct Discovery {
    pages: Vec<DiscoveredPage>,
    seen: HashSet<String>,
    limit: Option<usize>,
}

impl Discovery {
    fn new(limit: Option<usize>) -> Self {
        Self {
            pages: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    fn limit_reached(&self) -> bool {
        matches!(self.limit, Some(limit) if self.pages.len() >= limit)
    }

    /// Adds a page unless its type is skipped or its id was already seen.
    fn offer(&mut self, page: DiscoveredPage) {
        if page.content_type.is_skipped() {
            info!(
                page_id = %page.id,
                title = %page.title,
                content_type = %page.content_type,
                "Skipping non-page content type"
            );
            return;
        }
        if self.seen.insert(page.id.clone()) {
            self.pages.push(page);
        }
    }

    fn log_limit(&self) {
        if let Some(limit) = self.limit {
            info!(limit, "max_pages_to_scan limit reached");
        }
    }
}

impl PageScanner {
    pub fn new(
        api: Arc<dyn ConfluenceApi>,
        confluence: &ConfluenceConfig,
        processing: &ProcessingConfig,
    ) -> Self {
        Self {
            api,
            ingest_all_label: confluence.ingest_all_label.clone(),
            max_pages_to_scan: processing.max_pages_to_scan,
        }
    }

    /// Runs the label search and descendant expansion.
    pub async fn discover_pages(&self) -> SyncResult<Vec<DiscoveredPage>> {
        async {
            let labelled = self.api.search_pages_by_label().await?;
            let mut discovery = Discovery::new(self.max_pages_to_scan);
            let mut roots: Vec<String> = Vec::new();

            for raw in &labelled {
                if discovery.limit_reached() {
                    discovery.log_limit();
                    return Ok(self.finish(discovery, labelled.len()));
                }

                let page = self.to_discovered(raw);
                if has_label(&page.labels, &self.ingest_all_label) && !roots.contains(&page.id) {
                    roots.push(page.id.clone());
                }
                discovery.offer(page);
            }

            if !roots.is_empty() && !discovery.limit_reached() {
                self.expand_descendants(&roots, &mut discovery).await;
            } else if discovery.limit_reached() {
                discovery.log_limit();
            }

            Ok(self.finish(discovery, labelled.len()))
        }
        .instrument(tenant::service_span::<Self>())
        .await
    }

    async fn expand_descendants(&self, roots: &[String], discovery: &mut Discovery) {
        let descendants = match self.api.get_descendant_pages(roots).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(
                    roots = roots.len(),
                    error = %sanitize(&e.to_string()),
                    "Failed to fetch descendant pages, continuing with labelled pages"
                );
                return;
            }
        };

        for raw in &descendants {
            if discovery.limit_reached() {
                discovery.log_limit();
                return;
            }
            discovery.offer(self.to_discovered(raw));
        }
    }

    fn finish(&self, discovery: Discovery, labelled: usize) -> Vec<DiscoveredPage> {
        info!(
            labelled,
            discovered = discovery.pages.len(),
            "Page discovery completed"
        );
        discovery.pages
    }

    fn to_discovered(&self, page: &ConfluencePage) -> DiscoveredPage {
        let space = page.space();
        DiscoveredPage {
            id: page.id.clone(),
            title: page.title.clone(),
            content_type: ContentType::from_api(&page.content_type),
            space_id: space.id,
            space_key: space.key,
            space_name: space.name,
            version_timestamp: page.version_when().to_string(),
            web_url: self.api.build_page_web_url(page),
            labels: page.label_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::tests::test_config;
    use crate::testing::{page, FakeConfluence};

    fn scanner(api: Arc<FakeConfluence>, max_pages: Option<usize>) -> PageScanner {
        let config = test_config();
        let mut processing = config.processing.clone();
        processing.max_pages_to_scan = max_pages;
        PageScanner::new(api, &config.confluence, &processing)
    }

    fn ids(pages: &[DiscoveredPage]) -> Vec<&str> {
        pages.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_discovers_labelled_pages() {
        let api = Arc::new(FakeConfluence::new().with_search(vec![
            page("1", "page", &["ai-ingest", "hr"]),
            page("2", "page", &["ai-ingest"]),
        ]));

        let pages = scanner(api.clone(), None).discover_pages().await.unwrap();

        assert_eq!(ids(&pages), vec!["1", "2"]);
        assert_eq!(pages[0].space_key, "ENG");
        assert_eq!(pages[0].space_id, "98304");
        assert_eq!(pages[0].version_timestamp, "2026-01-01T10:00:00.000Z");
        assert_eq!(pages[0].web_url, "https://acme.atlassian.net/wiki/spaces/ENG/pages/1");
        assert!(api.descendant_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skips_non_page_types_and_duplicates() {
        let api = Arc::new(FakeConfluence::new().with_search(vec![
            page("1", "page", &["ai-ingest"]),
            page("2", "blogpost", &["ai-ingest"]),
            page("3", "whiteboard", &["ai-ingest"]),
            page("4", "database", &["ai-ingest"]),
            page("5", "embed", &["ai-ingest"]),
            page("1", "page", &["ai-ingest"]),
            page("6", "folder", &["ai-ingest"]),
        ]));

        let pages = scanner(api, None).discover_pages().await.unwrap();
        assert_eq!(ids(&pages), vec!["1", "6"]);
    }

    #[tokio::test]
    async fn test_expands_ingest_all_roots_in_one_call() {
        let api = Arc::new(
            FakeConfluence::new()
                .with_search(vec![
                    page("1", "page", &["ai-ingest-all"]),
                    page("2", "page", &["ai-ingest"]),
                    page("3", "folder", &["ai-ingest-all"]),
                ])
                .with_descendants(vec![
                    page("10", "page", &[]),
                    page("2", "page", &[]),
                    page("11", "blogpost", &[]),
                    page("12", "page", &[]),
                ]),
        );

        let pages = scanner(api.clone(), None).discover_pages().await.unwrap();

        assert_eq!(ids(&pages), vec!["1", "2", "3", "10", "12"]);
        let calls = api.descendant_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["1".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn test_skipped_type_with_all_label_is_still_a_root() {
        let api = Arc::new(
            FakeConfluence::new()
                .with_search(vec![page("1", "database", &["ai-ingest-all"])])
                .with_descendants(vec![page("10", "page", &[])]),
        );

        let pages = scanner(api.clone(), None).discover_pages().await.unwrap();

        assert_eq!(ids(&pages), vec!["10"]);
        assert_eq!(api.descendant_calls.lock().unwrap()[0], vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_descendant_failure_keeps_labelled_pages() {
        let api = Arc::new(
            FakeConfluence::new()
                .with_search(vec![
                    page("1", "page", &["ai-ingest-all"]),
                    page("2", "page", &["ai-ingest"]),
                ])
                .failing_descendants(),
        );

        let pages = scanner(api, None).discover_pages().await.unwrap();
        assert_eq!(ids(&pages), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_max_pages_caps_labelled_and_descendants() {
        let api = Arc::new(
            FakeConfluence::new()
                .with_search(vec![
                    page("1", "page", &["ai-ingest-all"]),
                    page("2", "page", &["ai-ingest"]),
                ])
                .with_descendants(vec![page("10", "page", &[]), page("11", "page", &[])]),
        );

        let pages = scanner(api.clone(), Some(3)).discover_pages().await.unwrap();
        assert_eq!(ids(&pages), vec!["1", "2", "10"]);

        let pages = scanner(api.clone(), Some(1)).discover_pages().await.unwrap();
        assert_eq!(ids(&pages), vec!["1"]);
        assert_eq!(api.descendant_calls.lock().unwrap().len(), 1);
    }
}
