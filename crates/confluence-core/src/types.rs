//! # Domain Types
//!
//! Types that flow through one sync run.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Run Types                                  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ DiscoveredPage  │──►│  FileDiffItem   │──►│ FileDiffResult  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id, title      │   │  key            │   │  new/updated    │       │
//! │  │  space key/name │   │  url            │   │  deleted/moved  │       │
//! │  │  version ts     │   │  updated_at     │   │  deleted_keys   │       │
//! │  │  labels         │   └─────────────────┘   └────────┬────────┘       │
//! │  └────────┬────────┘                                  │                │
//! │           │           new ∪ updated                   │                │
//! │           └──────────────────┬────────────────────────┘                │
//! │                              ▼                                          │
//! │                     ┌─────────────────┐                                 │
//! │                     │   FetchedPage   │  body + stripped labels         │
//! │                     └─────────────────┘                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these are persisted. They live for the duration of one run.

use serde::{Deserialize, Serialize};

// =============================================================================
// Instance Type
// =============================================================================

/// Which Confluence deployment a tenant talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceType {
    /// Atlassian-hosted Confluence Cloud.
    Cloud,

    /// Self-hosted Confluence Data Center.
    DataCenter,
}

impl InstanceType {
    /// The `sourceKind` recorded on every downstream content item.
    pub fn source_kind(&self) -> &'static str {
        match self {
            InstanceType::Cloud => "ATLASSIAN_CONFLUENCE_CLOUD",
            InstanceType::DataCenter => "ATLASSIAN_CONFLUENCE_DATA_CENTER",
        }
    }
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceType::Cloud => write!(f, "cloud"),
            InstanceType::DataCenter => write!(f, "data-center"),
        }
    }
}

// =============================================================================
// Content Type
// =============================================================================

/// Confluence content type as reported by the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Page,
    Blogpost,
    Database,
    Whiteboard,
    Embed,
    Folder,
    Attachment,
    /// Anything Confluence adds later.
    #[serde(other)]
    Other,
}

impl ContentType {
    /// Parses the raw `type` string, mapping unknown values to [`ContentType::Other`].
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "page" => ContentType::Page,
            "blogpost" => ContentType::Blogpost,
            "database" => ContentType::Database,
            "whiteboard" => ContentType::Whiteboard,
            "embed" => ContentType::Embed,
            "folder" => ContentType::Folder,
            "attachment" => ContentType::Attachment,
            _ => ContentType::Other,
        }
    }

    /// Returns true if content of this type is never ingested.
    pub fn is_skipped(&self) -> bool {
        crate::SKIPPED_CONTENT_TYPES.contains(self)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentType::Page => "page",
            ContentType::Blogpost => "blogpost",
            ContentType::Database => "database",
            ContentType::Whiteboard => "whiteboard",
            ContentType::Embed => "embed",
            ContentType::Folder => "folder",
            ContentType::Attachment => "attachment",
            ContentType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Pages
// =============================================================================

/// A page found by the scanner, before its body is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPage {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    pub space_id: String,
    pub space_key: String,
    pub space_name: String,
    /// `version.when` as reported by Confluence (ISO-8601).
    pub version_timestamp: String,
    pub web_url: String,
    pub labels: Vec<String>,
}

/// Extra metadata attached to an ingested page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Labels left after removing both trigger labels. Never empty.
    pub confluence_labels: Vec<String>,
}

/// A page with its storage-format body resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub id: String,
    pub title: String,
    /// Storage-format XHTML.
    pub body: String,
    pub web_url: String,
    pub space_id: String,
    pub space_key: String,
    pub space_name: String,
    pub metadata: Option<PageMetadata>,
}

impl FetchedPage {
    /// Labels to report downstream, empty when no metadata was attached.
    pub fn confluence_labels(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.confluence_labels.as_slice())
            .unwrap_or(&[])
    }
}

// =============================================================================
// File Diff
// =============================================================================

/// One manifest entry submitted to the downstream diff endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiffItem {
    pub key: String,
    pub url: String,
    pub updated_at: String,
}

/// Diff outcome collapsed to owning page ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiffResult {
    pub new_page_ids: Vec<String>,
    pub updated_page_ids: Vec<String>,
    pub deleted_page_ids: Vec<String>,
    pub moved_page_ids: Vec<String>,
    /// Tenant-prefixed ingestion keys of deleted items.
    pub deleted_keys: Vec<String>,
}

impl FileDiffResult {
    /// Ids of pages whose content must be fetched and ingested, in diff order.
    pub fn page_ids_to_fetch(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.new_page_ids
            .iter()
            .chain(self.updated_page_ids.iter())
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}
