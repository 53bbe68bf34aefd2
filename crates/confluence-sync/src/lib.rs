//! # confluence-sync: Tenant-Scoped Sync Engine
//!
//! This crate crawls Confluence for every configured tenant and keeps the
//! matching content in Unique up to date.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              TenantSyncScheduler (cron, one job per tenant)      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ tenant::scope(ctx, …)                   │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │                 SyncOrchestrator (one run at a time)             │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │    ┌──────────────┬───────────┼────────────┬──────────────┐            │
//! │    ▼              ▼           ▼            ▼              ▼            │
//! │  ┌────────┐  ┌─────────┐  ┌────────┐  ┌──────────┐  ┌───────────┐     │
//! │  │ Scope  │  │ Page    │  │ File   │  │ Content  │  │ Ingestion │     │
//! │  │ Mgmt   │  │ Scanner │  │ Diff   │  │ Fetcher  │  │ Service   │     │
//! │  └───┬────┘  └────┬────┘  └───┬────┘  └────┬─────┘  └─────┬─────┘     │
//! │      │            │           │            │              │            │
//! │  ┌───▼────────────▼───────────▼────────────▼──────────────▼─────────┐  │
//! │  │  ConfluenceApi (cloud | dc)          UniqueApiClient (4 traits)  │  │
//! │  │  ConfluenceAuth + TokenCache         UniqueAuth + TokenCache     │  │
//! │  │  RateLimitedHttpClient (governor + backoff + reqwest)            │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Tenancy
//! - [`config`] - Tenant config discovery, placeholders, validation
//! - [`tenant`] - Task-local tenant context and service registry
//! - [`registry`] - Builds every tenant's clients and services
//!
//! ### Outbound
//! - [`auth`] - Confluence and Unique credential strategies
//! - [`http`] - Rate-limited HTTP client with retries
//! - [`confluence`] - Confluence Cloud / Data Center API
//! - [`unique`] - Unique ingestion and scope management API
//!
//! ### Pipeline
//! - [`scanner`] - Label search and descendant expansion
//! - [`file_diff`] - Change detection with the mass-deletion guard
//! - [`fetcher`] - Page body retrieval
//! - [`scope`] - Root and per-space scopes
//! - [`ingestion`] - Register, upload, finalize, delete
//! - [`orchestrator`] - One sync run
//! - [`scheduler`] - Cron scheduling and shutdown
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use confluence_sync::{build_registry, get_tenant_configs, TenantSyncScheduler};
//!
//! let configs = get_tenant_configs()?;
//! let registry = Arc::new(build_registry(&configs)?);
//!
//! let scheduler = TenantSyncScheduler::new(registry);
//! scheduler.start().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Tenancy
pub mod config;
pub mod error;
pub mod registry;
pub mod tenant;

// Outbound clients
pub mod auth;
pub mod confluence;
pub mod http;
pub mod unique;

// Pipeline
pub mod fetcher;
pub mod file_diff;
pub mod ingestion;
pub mod orchestrator;
pub mod scanner;
pub mod scheduler;
pub mod scope;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{get_tenant_configs, load_tenant_configs, NamedTenantConfig, TenantConfig};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncReport};
pub use registry::{build_registry, TenantClients};
pub use scheduler::TenantSyncScheduler;
pub use tenant::{TenantContext, TenantRegistry};
