//! # confluence-core: Pure Domain Logic for the Confluence Connector
//!
//! This crate holds everything about a sync run that can be decided without
//! touching the network: what a page looks like once discovered, how diff
//! keys are spelled, which labels are triggers, and which linked files in a
//! page body are worth ingesting.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Confluence Connector Architecture                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/connector (process bootstrap)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         confluence-sync (tenants, auth, HTTP, pipeline)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ confluence-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   keys    │  │  labels   │  │   links   │  │   │
//! │  │   │ Discovered│  │ diff keys │  │  trigger  │  │ linked    │  │   │
//! │  │   │ FetchedPg │  │ ext. ids  │  │  stripping│  │ files     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • PURE FUNCTIONS                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Page, diff and instance types
//! - [`keys`] - Diff/ingestion key construction and page-id recovery
//! - [`labels`] - Trigger label stripping
//! - [`links`] - Linked-file extraction from page storage HTML
//! - [`validation`] - Tenant name and URL rules
//! - [`error`] - Validation error types
//!
//! ## Example Usage
//!
//! ```rust
//! use confluence_core::labels::extract_labels;
//!
//! let labels = vec![
//!     "ai-ingest".to_string(),
//!     "ai-ingest-all".to_string(),
//!     "engineering".to_string(),
//! ];
//! assert_eq!(
//!     extract_labels(&labels, "ai-ingest", "ai-ingest-all"),
//!     vec!["engineering".to_string()]
//! );
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod keys;
pub mod labels;
pub mod links;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::ValidationError;
pub use types::{
    ContentType, DiscoveredPage, FetchedPage, FileDiffItem, FileDiffResult, InstanceType,
    PageMetadata,
};

// =============================================================================
// Constants
// =============================================================================

/// Prefix of the external id stored on every space scope (`confc:{tenant}:{space}`).
pub const EXTERNAL_ID_PREFIX: &str = "confc";

/// Owner type of every registered content item.
pub const OWNER_TYPE: &str = "SCOPE";

/// Source owner type of every registered content item.
pub const SOURCE_OWNER_TYPE: &str = "COMPANY";

/// Service id sent to cluster-local Unique services.
pub const SERVICE_ID: &str = "confluence-connector";

/// Content types never ingested even when labelled.
pub const SKIPPED_CONTENT_TYPES: [ContentType; 4] = [
    ContentType::Database,
    ContentType::Blogpost,
    ContentType::Whiteboard,
    ContentType::Embed,
];
