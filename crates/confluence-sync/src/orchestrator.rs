//! # Sync Orchestrator
//!
//! Runs one full synchronization for the current tenant.
//!
//! ## Sync Run
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      One Sync Run (per tenant)                          │
//! │                                                                         │
//! │  is_scanning CAS ── already set ──► "Sync already in progress"          │
//! │        │                                                                │
//! │        ▼              every step: shutdown check + step timeout         │
//! │  ┌─────────────────┐  (fetch, ingest: timeout per page)                 │
//! │  │ 1. scopes       │  initialize root scope (once per process)         │
//! │  │ 2. discover     │  label search + descendants                       │
//! │  │ 3. diff         │  manifest → new / updated / deleted               │
//! │  │ 4. fetch        │  bodies of new ∪ updated pages                    │
//! │  │ 5. ingest       │  pages (bounded concurrency) + linked files       │
//! │  │ 6. delete       │  content of deleted keys                          │
//! │  └─────────────────┘                                                    │
//! │  with file ingestion on, 4 runs before 3 over every discovered page    │
//! │  so linked-file keys are part of the manifest                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ScanGuard dropped ──► is_scanning = false (success, error or panic)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Step failures end the run. Per-page and per-file failures are handled in
//! the services and never reach this level.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use confluence_core::links::extract_file_urls;
use confluence_core::FetchedPage;
use futures::StreamExt;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::error::{sanitize, SyncError, SyncResult};
use crate::fetcher::ContentFetcher;
use crate::file_diff::FileDiffService;
use crate::ingestion::IngestionService;
use crate::scanner::PageScanner;
use crate::scope::ScopeManagementService;
use crate::tenant::{self, TenantContext};

/// Counts of one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub discovered: usize,
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    pub fetched: usize,
}

/// How a call to [`SyncOrchestrator::synchronize`] ended.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Another run for the tenant was in progress.
    Skipped,
    Completed(SyncReport),
    Failed(SyncError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOrchestrator;

impl SyncOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Synchronizes the tenant of the current [`tenant::scope`].
    pub async fn synchronize(&self) -> SyncOutcome {
        let ctx = match tenant::current() {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(error = %e, "Sync failed");
                return SyncOutcome::Failed(e);
            }
        };

        let Some(_guard) = ctx.try_begin_scan() else {
            info!(tenant = %ctx.name, "Sync already in progress, skipping");
            return SyncOutcome::Skipped;
        };

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync", tenant = %ctx.name, run_id = %run_id);

        async {
            info!("Starting sync");
            let started = Instant::now();

            match self.run(&ctx).await {
                Ok(report) => {
                    info!(
                        discovered = report.discovered,
                        new = report.new,
                        updated = report.updated,
                        deleted = report.deleted,
                        fetched = report.fetched,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Sync completed"
                    );
                    SyncOutcome::Completed(report)
                }
                Err(SyncError::ShuttingDown) => {
                    warn!("Sync stopped early for shutdown");
                    SyncOutcome::Failed(SyncError::ShuttingDown)
                }
                Err(e) => {
                    tracing::error!(
                        error = %sanitize(&e.to_string()),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Sync failed"
                    );
                    SyncOutcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, ctx: &Arc<TenantContext>) -> SyncResult<SyncReport> {
        let scopes = ctx.service::<ScopeManagementService>()?;
        let scanner = ctx.service::<PageScanner>()?;
        let differ = ctx.service::<FileDiffService>()?;
        let fetcher = ctx.service::<ContentFetcher>()?;
        let ingestion = ctx.service::<IngestionService>()?;

        step(ctx, "initialize_scopes", scopes.initialize()).await?;

        let discovered = step(ctx, "discover_pages", scanner.discover_pages()).await?;

        // Linked files only show up in page bodies, so with file ingestion on
        // every page is fetched before the diff and its files join the manifest.
        let prefetched = if ctx.config.ingestion.file_ingestion_enabled() {
            Some(batch_step(ctx, "fetch_content", fetcher.fetch_pages_content(&discovered)).await?)
        } else {
            None
        };
        let bodies: Option<HashMap<String, String>> = prefetched.as_ref().map(|pages| {
            pages
                .iter()
                .map(|p| (p.id.clone(), p.body.clone()))
                .collect()
        });

        let diff = step(ctx, "compute_diff", differ.compute_diff(&discovered, bodies.as_ref())).await?;

        let wanted: HashSet<String> = diff.page_ids_to_fetch().into_iter().collect();
        let fetched: Vec<FetchedPage> = match prefetched {
            Some(pages) => pages.into_iter().filter(|p| wanted.contains(&p.id)).collect(),
            None => {
                let to_fetch: Vec<_> = discovered
                    .iter()
                    .filter(|p| wanted.contains(&p.id))
                    .cloned()
                    .collect();
                batch_step(ctx, "fetch_content", fetcher.fetch_pages_content(&to_fetch)).await?
            }
        };

        batch_step(ctx, "ingest_content", self.ingest(ctx, &scopes, &ingestion, &fetched)).await?;

        if !diff.deleted_keys.is_empty() {
            step(ctx, "delete_content", async {
                ingestion.delete_content(&diff.deleted_keys).await;
                Ok(())
            })
            .await?;
        }

        Ok(SyncReport {
            discovered: discovered.len(),
            new: diff.new_page_ids.len(),
            updated: diff.updated_page_ids.len(),
            deleted: diff.deleted_keys.len(),
            fetched: fetched.len(),
        })
    }

    async fn ingest(
        &self,
        ctx: &TenantContext,
        scopes: &ScopeManagementService,
        ingestion: &IngestionService,
        pages: &[FetchedPage],
    ) {
        if pages.is_empty() {
            return;
        }

        let mut space_keys: Vec<String> = pages.iter().map(|p| p.space_key.clone()).collect();
        space_keys.sort();
        space_keys.dedup();
        if let Err(e) = scopes.ensure_space_scopes(&space_keys).await {
            warn!(
                spaces = space_keys.len(),
                error = %sanitize(&e.to_string()),
                "Batch scope creation failed, falling back to per-page resolution"
            );
        }

        let concurrency = ctx.config.processing.concurrency.max(1);
        let page_timeout = Duration::from_secs(ctx.config.processing.step_timeout_seconds);
        let ingest_files = ctx.config.ingestion.file_ingestion_enabled();
        let allowed = ctx.config.ingestion.allowed_file_extensions.as_slice();
        let base_url = ctx.config.confluence.base_url.as_str();

        futures::stream::iter(pages)
            .for_each_concurrent(concurrency, move |page| async move {
                if tokio::time::timeout(page_timeout, ingestion.ingest_page(page))
                    .await
                    .is_err()
                {
                    tracing::error!(
                        page_id = %page.id,
                        title = %page.title,
                        timeout_secs = page_timeout.as_secs(),
                        "Timed out ingesting page"
                    );
                }

                // File transfers are bounded per request by the HTTP clients.
                if ingest_files && !page.body.is_empty() {
                    let urls = extract_file_urls(&page.body, allowed, base_url);
                    if !urls.is_empty() {
                        ingestion.ingest_files(page, &urls).await;
                    }
                }
            })
            .await;

        info!(pages = pages.len(), concurrency, "Content ingestion completed");
    }
}

/// Runs one step under the tenant's step timeout, refusing to start during shutdown.
async fn step<T, F>(ctx: &TenantContext, name: &str, fut: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    if ctx.is_shutting_down() {
        return Err(SyncError::ShuttingDown);
    }

    let secs = ctx.config.processing.step_timeout_seconds;
    tracing::debug!(step = name, "Running sync step");
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout {
            step: name.to_string(),
            secs,
        }),
    }
}

/// Runs a per-page step. Its length grows with the batch, so the step timeout
/// bounds each page inside it instead of the whole step.
async fn batch_step<T, F>(ctx: &TenantContext, name: &str, fut: F) -> SyncResult<T>
where
    F: Future<Output = T>,
{
    if ctx.is_shutting_down() {
        return Err(SyncError::ShuttingDown);
    }

    tracing::debug!(step = name, "Running sync step");
    Ok(fut.await)
}
