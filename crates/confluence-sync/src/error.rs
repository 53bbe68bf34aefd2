//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Tenant Context │  │     Transport           │ │
//! │  │  (fatal/start)  │  │                 │  │     (transient)         │ │
//! │  │  InvalidConfig  │  │  NoTenantContext│  │  Http / HttpStatus      │ │
//! │  │  MissingEnvVar  │  │  ServiceNotFound│  │  RateLimitDropped       │ │
//! │  │  TenantConfig.. │  │  UnknownTenant  │  │  Timeout / GraphQl      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │      Auth       │  │   Sync Run      │  │     Scheduling          │ │
//! │  │                 │  │  (fatal/run)    │  │                         │ │
//! │  │ TokenAcquisition│  │ MassDeletion..  │  │  Scheduler              │ │
//! │  │                 │  │ ScopeNotFound   │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-item failures (one page, one file, one delete batch) are logged where
//! they happen and never reach the orchestrator as errors.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Clone` so one token failure can reach every waiter
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid tenant configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required environment variable is not set.
    #[error("Environment variable {name} is not set")]
    MissingEnvVar { name: String },

    /// Failed to read or parse a config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// One tenant config file failed to load or validate.
    #[error("Failed to load or validate tenant config from {path}: {message}")]
    TenantConfigFile { path: String, message: String },

    /// Every tenant config resolved to inactive or deleted.
    #[error("No active tenant configurations found. At least one tenant must have status \"active\".")]
    NoActiveTenants,

    /// A config file name yields an invalid tenant name.
    #[error("Invalid tenant name '{name}' extracted from '{path}': {message}")]
    InvalidTenantName {
        name: String,
        path: String,
        message: String,
    },

    /// Two config files map to the same tenant name.
    #[error("Duplicate tenant name '{name}' found in '{first}' and '{second}'")]
    DuplicateTenant {
        name: String,
        first: String,
        second: String,
    },

    // =========================================================================
    // Tenant Context Errors
    // =========================================================================
    /// Code that needs a tenant ran outside `tenant::scope`.
    #[error("No tenant context available. Wrap the call in tenant::scope.")]
    NoTenantContext,

    /// A tenant has no service of the requested type registered.
    #[error("Service {service} is not registered for tenant '{tenant}'")]
    ServiceNotFound { tenant: String, service: String },

    /// Lookup of a tenant that was never loaded.
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    // =========================================================================
    // Auth Errors
    // =========================================================================
    /// Token endpoint failed or returned an unusable token.
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Upstream answered with a non-2xx status.
    #[error("Error response from {url}: {status} {body}")]
    HttpStatus { url: String, status: u16, body: String },

    /// Request waited too long for a rate-limit permit.
    #[error("Request to {url} dropped by rate limiter after waiting {waited_secs}s")]
    RateLimitDropped { url: String, waited_secs: u64 },

    /// A sync step exceeded its timeout.
    #[error("Step '{step}' timed out after {secs} seconds")]
    Timeout { step: String, secs: u64 },

    /// Response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// GraphQL response carried errors.
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    // =========================================================================
    // Sync Run Errors
    // =========================================================================
    /// The diff would delete everything; the run is aborted.
    #[error("{0}")]
    MassDeletionGuard(String),

    /// A scope in the root chain does not exist.
    #[error("{0}")]
    ScopeNotFound(String),

    /// Space scope creation attempted before `initialize`.
    #[error("Scope management service is not initialized")]
    ScopeNotInitialized,

    /// The scope service returned no scope for a created path.
    #[error("Failed to create scope: {0}")]
    ScopeCreation(String),

    /// Blob upload returned a non-2xx status.
    #[error("Upload failed with status {status}")]
    Upload { status: u16 },

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    /// Cron scheduler failed.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Process is shutting down.
    #[error("Connector is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidConfig(format!("Invalid URL: {}", err))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Http(err.to_string())
    }
}

impl From<confluence_core::ValidationError> for SyncError {
    fn from(err: confluence_core::ValidationError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for SyncError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        SyncError::Scheduler(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the request can be retried.
    ///
    /// ## Retryable Errors
    /// - Connection failures and request timeouts
    /// - 429 and 502/503/504 responses
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(_) | SyncError::Timeout { .. } => true,
            SyncError::HttpStatus { status, .. } => {
                matches!(status, 429 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

// =============================================================================
// Sanitization
// =============================================================================

/// Strips credentials from an error message before it is logged.
///
/// Redacts bearer tokens, Basic credentials, and `client_secret` / `token` /
/// `access_token` values in query or JSON form.
pub fn sanitize(message: &str) -> String {
    let mut out = message.to_string();

    for scheme in ["Bearer ", "bearer ", "Basic ", "basic "] {
        out = redact_after(&out, scheme, |c| c.is_whitespace() || c == '"' || c == ',');
    }

    for key in ["client_secret", "access_token", "token", "password"] {
        out = redact_after(&out, &format!("{}=", key), |c| c == '&' || c.is_whitespace());
        out = redact_after(&out, &format!("\"{}\":\"", key), |c| c == '"');
    }

    out
}

fn redact_after(input: &str, marker: &str, stop: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find(marker) {
        let (head, tail) = rest.split_at(idx + marker.len());
        out.push_str(head);
        let end = tail.find(|c: char| stop(c)).unwrap_or(tail.len());
        if end > 0 {
            out.push_str("[REDACTED]");
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}
