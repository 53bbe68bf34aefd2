//! # Tenant Sync Scheduler
//!
//! Drives every tenant's sync on its own cron schedule.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Scheduler Lifecycle                                │
//! │                                                                         │
//! │  start()                                                                │
//! │    for each tenant: add cron job "sync:{tenant}"                        │
//! │                     (5-field cron → "0 " + cron)                        │
//! │    then for each tenant: spawn one immediate run                        │
//! │                                                                         │
//! │  every run:                                                             │
//! │      shutdown set? ──► "Skipping sync due to shutdown"                  │
//! │      tenant::scope(ctx, SyncOrchestrator::synchronize())                │
//! │                                                                         │
//! │  shutdown()                                                             │
//! │      set flag ──► remove jobs ──► stop scheduler                        │
//! │      wait_for_idle(30s) lets in-flight runs finish their step           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use crate::tenant::{self, TenantContext, TenantRegistry};

/// Counts one in-flight run until dropped.
struct ActiveRun {
    active: Arc<watch::Sender<usize>>,
}

impl ActiveRun {
    fn begin(active: &Arc<watch::Sender<usize>>) -> Self {
        active.send_modify(|n| *n += 1);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Cron-driven runner for all tenants.
pub struct TenantSyncScheduler {
    registry: Arc<TenantRegistry>,
    scheduler: Mutex<Option<JobScheduler>>,
    /// Job name and id of every registered job.
    jobs: Mutex<Vec<(String, Uuid)>>,
    active: Arc<watch::Sender<usize>>,
}

impl TenantSyncScheduler {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        let (active, _) = watch::channel(0usize);
        Self {
            registry,
            scheduler: Mutex::new(None),
            jobs: Mutex::new(Vec::new()),
            active: Arc::new(active),
        }
    }

    /// Starts one immediate run per tenant and registers the cron jobs.
    pub async fn start(&self) -> SyncResult<()> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_some() {
            return Err(SyncError::Scheduler("Scheduler already started".into()));
        }

        let scheduler = JobScheduler::new().await?;
        let mut jobs = self.jobs.lock().await;

        // No run starts until every job is registered.
        for ctx in self.registry.tenants() {
            let cron = ctx.config.processing.cron_expression();
            let job_ctx = Arc::clone(ctx);
            let active = Arc::clone(&self.active);
            let job = Job::new_async(cron.as_str(), move |_id, _scheduler| {
                let ctx = Arc::clone(&job_ctx);
                let run = ActiveRun::begin(&active);
                Box::pin(run_tenant(ctx, run))
            })?;

            let name = format!("sync:{}", ctx.name);
            let id = scheduler.add(job).await?;
            info!(tenant = %ctx.name, job = %name, cron = %cron, "Scheduled tenant sync");
            jobs.push((name, id));
        }

        scheduler.start().await?;
        info!(tenants = self.registry.len(), "Scheduler started");

        for ctx in self.registry.tenants() {
            let run = ActiveRun::begin(&self.active);
            tokio::spawn(run_tenant(Arc::clone(ctx), run));
        }

        *guard = Some(scheduler);
        Ok(())
    }

    /// Runs one tenant right away, outside its schedule.
    pub async fn trigger(&self, tenant_name: &str) -> SyncResult<()> {
        let ctx = self.registry.get(tenant_name)?;
        run_tenant(ctx, ActiveRun::begin(&self.active)).await;
        Ok(())
    }

    /// Names of the registered cron jobs.
    pub async fn job_names(&self) -> Vec<String> {
        self.jobs
            .lock()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Stops new runs and tears the scheduler down.
    ///
    /// Runs already in progress keep going until their current step ends.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.registry.request_shutdown();

        let Some(mut scheduler) = self.scheduler.lock().await.take() else {
            return Ok(());
        };

        for (name, id) in self.jobs.lock().await.drain(..) {
            if let Err(e) = scheduler.remove(&id).await {
                warn!(job = %name, error = %e, "Failed to remove scheduled job");
            }
        }

        scheduler.shutdown().await?;
        info!("Scheduler stopped");
        Ok(())
    }

    /// Number of runs currently in progress.
    pub fn active_runs(&self) -> usize {
        *self.active.borrow()
    }

    /// Waits until no run is in progress. Returns false on timeout.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.active.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

async fn run_tenant(ctx: Arc<TenantContext>, _run: ActiveRun) {
    if ctx.is_shutting_down() {
        info!(tenant = %ctx.name, "Skipping sync due to shutdown");
        return;
    }

    let span = tracing::info_span!("tenant", tenant = %ctx.name);
    tenant::scope(Arc::clone(&ctx), SyncOrchestrator::new().synchronize())
        .instrument(span)
        .await;
}
