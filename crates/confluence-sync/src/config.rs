//! # Tenant Configuration
//!
//! One TOML file per tenant, discovered through a glob pattern.
//!
//! ## Loading Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Tenant Config Loading                                │
//! │                                                                         │
//! │  TENANT_CONFIG_PATH_PATTERN=/etc/connector/*-tenant-config.toml        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  1. Glob match (walkdir + globset)      none → fatal                   │
//! │  2. Tenant name from file name          bad suffix → fatal             │
//! │  3. Validate names, then duplicates     invalid/duplicate → fatal      │
//! │        │                                                                │
//! │        ▼  per file                                                      │
//! │  4. Parse TOML, read `status`                                           │
//! │        ├── deleted  → skip (no further validation)                      │
//! │        ▼                                                                │
//! │  5. Resolve "os.environ/NAME" placeholders   missing var → fatal       │
//! │  6. Deserialize + validate                   invalid → fatal           │
//! │        ├── inactive → skip                                              │
//! │        ▼                                                                │
//! │  7. active → loaded                                                     │
//! │                                                                         │
//! │  Zero active tenants → fatal                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # acme-tenant-config.toml
//! status = "active"  # active | inactive | deleted
//!
//! [confluence]
//! instance_type = "cloud"  # cloud | data-center
//! base_url = "https://acme.atlassian.net"
//! cloud_id = "0f1e2d3c-..."
//! api_rate_limit_per_minute = 100
//! ingest_single_label = "ai-ingest"
//! ingest_all_label = "ai-ingest-all"
//!
//! [confluence.auth]
//! mode = "oauth_2lo"  # oauth_2lo | pat (pat is data-center only)
//! client_id = "abc"
//! client_secret = "os.environ/CONFLUENCE_CLIENT_SECRET"
//!
//! [unique]
//! service_auth_mode = "cluster_local"  # cluster_local | external
//! ingestion_service_base_url = "http://node-ingestion:8091"
//! scope_management_service_base_url = "http://node-scope-management:8094"
//!
//! [unique.service_extra_headers]
//! x-company-id = "company-1"
//! x-user-id = "user-1"
//!
//! [processing]
//! step_timeout_seconds = 300
//! concurrency = 4
//! scan_interval_cron = "*/15 * * * *"
//!
//! [ingestion]
//! ingestion_mode = "flat"
//! scope_id = "scope_root"
//! ingest_files = "enabled"
//! allowed_file_extensions = ["pdf", "docx"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use confluence_core::validation::{
    validate_base_url, validate_positive, validate_required, validate_tenant_name,
};
use confluence_core::InstanceType;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tokio_cron_scheduler::Job;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{SyncError, SyncResult};

/// Environment variable holding the tenant config glob.
pub const TENANT_CONFIG_PATH_ENV: &str = "TENANT_CONFIG_PATH_PATTERN";

/// Every tenant config file name ends with this.
pub const TENANT_CONFIG_SUFFIX: &str = "-tenant-config.toml";

/// String values starting with this are replaced by the named env var.
pub const ENV_PLACEHOLDER_PREFIX: &str = "os.environ/";

/// Headers that must be present in cluster-local mode and are smeared in logs.
pub const SMEARED_HEADER_KEYS: [&str; 2] = ["x-company-id", "x-user-id"];

// =============================================================================
// Tenant Status
// =============================================================================

/// Lifecycle status of a tenant config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Loaded and scheduled.
    #[default]
    Active,

    /// Validated but not scheduled.
    Inactive,

    /// Ignored without validation.
    Deleted,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantStatus::Active => write!(f, "active"),
            TenantStatus::Inactive => write!(f, "inactive"),
            TenantStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "inactive" => Ok(TenantStatus::Inactive),
            "deleted" => Ok(TenantStatus::Deleted),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown tenant status: '{}'. Valid options: active, inactive, deleted",
                other
            ))),
        }
    }
}

// =============================================================================
// Confluence Configuration
// =============================================================================

/// Source connection settings.
#[derive(Debug, Deserialize)]
pub struct ConfluenceConfig {
    pub instance_type: InstanceType,

    /// Site URL without trailing slash.
    pub base_url: String,

    /// Atlassian cloud id. Required for cloud instances.
    #[serde(default)]
    pub cloud_id: Option<String>,

    pub auth: ConfluenceAuthConfig,

    /// Confluence requests per minute for this tenant.
    #[serde(default = "default_confluence_rate_limit")]
    pub api_rate_limit_per_minute: u32,

    /// Label that marks a single page for ingestion.
    pub ingest_single_label: String,

    /// Label that marks a page and all its descendants for ingestion.
    pub ingest_all_label: String,
}

fn default_confluence_rate_limit() -> u32 {
    100
}

/// How the connector authenticates against Confluence.
#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConfluenceAuthConfig {
    /// OAuth 2.0 client credentials (two-legged).
    #[serde(rename = "oauth_2lo")]
    OAuth2Lo {
        client_id: String,
        #[serde(deserialize_with = "deserialize_secret")]
        client_secret: SecretString,
    },

    /// Personal access token. Data Center only.
    Pat {
        #[serde(deserialize_with = "deserialize_secret")]
        token: SecretString,
    },
}

impl ConfluenceAuthConfig {
    pub fn mode_name(&self) -> &'static str {
        match self {
            ConfluenceAuthConfig::OAuth2Lo { .. } => "oauth_2lo",
            ConfluenceAuthConfig::Pat { .. } => "pat",
        }
    }
}

// =============================================================================
// Unique Configuration
// =============================================================================

/// Downstream (Unique) connection settings.
#[derive(Debug, Deserialize)]
pub struct UniqueConfig {
    #[serde(flatten)]
    pub auth: UniqueAuthConfig,

    pub ingestion_service_base_url: String,

    pub scope_management_service_base_url: String,

    /// Unique requests per minute for this tenant.
    #[serde(default = "default_unique_rate_limit")]
    pub api_rate_limit_per_minute: u32,

    /// Passed through verbatim on content registration.
    #[serde(default)]
    pub ingestion_config: Option<serde_json::Map<String, serde_json::Value>>,
}

fn default_unique_rate_limit() -> u32 {
    1000
}

/// How the connector authenticates against Unique.
#[derive(Deserialize)]
#[serde(tag = "service_auth_mode", rename_all = "snake_case")]
pub enum UniqueAuthConfig {
    /// In-cluster calls identified by static headers.
    ClusterLocal {
        service_extra_headers: BTreeMap<String, String>,
    },

    /// Zitadel client credentials.
    External {
        zitadel_oauth_token_url: String,
        #[serde(deserialize_with = "deserialize_secret")]
        zitadel_project_id: SecretString,
        zitadel_client_id: String,
        #[serde(deserialize_with = "deserialize_secret")]
        zitadel_client_secret: SecretString,
    },
}

impl std::fmt::Debug for UniqueAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueAuthConfig::ClusterLocal {
                service_extra_headers,
            } => {
                let headers: BTreeMap<&str, String> = service_extra_headers
                    .iter()
                    .map(|(k, v)| {
                        let shown = if SMEARED_HEADER_KEYS.contains(&k.as_str()) {
                            smear(v)
                        } else {
                            v.clone()
                        };
                        (k.as_str(), shown)
                    })
                    .collect();
                f.debug_struct("ClusterLocal")
                    .field("service_extra_headers", &headers)
                    .finish()
            }
            UniqueAuthConfig::External {
                zitadel_oauth_token_url,
                zitadel_project_id,
                zitadel_client_id,
                zitadel_client_secret,
            } => f
                .debug_struct("External")
                .field("zitadel_oauth_token_url", zitadel_oauth_token_url)
                .field("zitadel_project_id", zitadel_project_id)
                .field("zitadel_client_id", zitadel_client_id)
                .field("zitadel_client_secret", zitadel_client_secret)
                .finish(),
        }
    }
}

/// Hides all but the last four characters of a diagnostic value.
pub fn smear(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let visible = if chars.len() > 4 { 4 } else { 0 };
    let hidden = chars.len() - visible;
    let mut out = "*".repeat(hidden);
    out.extend(&chars[hidden..]);
    out
}

// =============================================================================
// Processing Configuration
// =============================================================================

/// Scheduling and throughput settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound for each pipeline step and for queued HTTP requests.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,

    /// Pages ingested in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Five-field (or six-field with seconds) cron expression.
    pub scan_interval_cron: String,

    /// Stop discovery after this many pages.
    #[serde(default)]
    pub max_pages_to_scan: Option<usize>,
}

fn default_step_timeout() -> u64 {
    300
}

fn default_concurrency() -> usize {
    1
}

impl ProcessingConfig {
    /// Cron expression with a seconds field, as the scheduler expects.
    pub fn cron_expression(&self) -> String {
        normalize_cron(&self.scan_interval_cron)
    }
}

/// Prefixes a `0` seconds field onto five-field cron expressions.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

// =============================================================================
// Ingestion Configuration
// =============================================================================

/// How pages map onto scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMode {
    /// One scope per space directly under the root scope.
    #[default]
    Flat,

    /// Scope tree mirroring the page tree. Not supported yet.
    Recursive,
}

/// Whether linked files are ingested next to their pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestFiles {
    Enabled,
    #[default]
    Disabled,
}

/// Where and what to ingest.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub ingestion_mode: IngestionMode,

    /// Root scope every space scope is created under.
    pub scope_id: String,

    #[serde(default)]
    pub ingest_files: IngestFiles,

    /// Extensions of linked files to ingest (without dot).
    #[serde(default)]
    pub allowed_file_extensions: Vec<String>,
}

impl IngestionConfig {
    pub fn file_ingestion_enabled(&self) -> bool {
        self.ingest_files == IngestFiles::Enabled
    }
}

// =============================================================================
// Tenant Configuration
// =============================================================================

/// Fully resolved configuration of one tenant.
#[derive(Debug, Deserialize)]
pub struct TenantConfig {
    pub confluence: ConfluenceConfig,
    pub unique: UniqueConfig,
    pub processing: ProcessingConfig,
    pub ingestion: IngestionConfig,
}

impl TenantConfig {
    /// Parses a TOML document (placeholders already resolved) and validates it.
    pub fn from_toml_str(content: &str) -> SyncResult<Self> {
        let config: TenantConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field rules the types cannot express.
    pub fn validate(&self) -> SyncResult<()> {
        let confluence = &self.confluence;
        validate_base_url("confluence.base_url", &confluence.base_url)?;
        validate_required("confluence.ingest_single_label", &confluence.ingest_single_label)?;
        validate_required("confluence.ingest_all_label", &confluence.ingest_all_label)?;
        validate_positive(
            "confluence.api_rate_limit_per_minute",
            confluence.api_rate_limit_per_minute as u64,
        )?;

        match confluence.instance_type {
            InstanceType::Cloud => {
                let cloud_id = confluence.cloud_id.as_deref().unwrap_or_default();
                validate_required("confluence.cloud_id", cloud_id)?;
                if matches!(confluence.auth, ConfluenceAuthConfig::Pat { .. }) {
                    return Err(SyncError::InvalidConfig(
                        "confluence.auth.mode 'pat' is only supported for data-center instances"
                            .to_string(),
                    ));
                }
            }
            InstanceType::DataCenter => {}
        }

        if let ConfluenceAuthConfig::OAuth2Lo { client_id, .. } = &confluence.auth {
            validate_required("confluence.auth.client_id", client_id)?;
        }

        let unique = &self.unique;
        validate_base_url(
            "unique.ingestion_service_base_url",
            &unique.ingestion_service_base_url,
        )?;
        validate_base_url(
            "unique.scope_management_service_base_url",
            &unique.scope_management_service_base_url,
        )?;
        validate_positive(
            "unique.api_rate_limit_per_minute",
            unique.api_rate_limit_per_minute as u64,
        )?;

        match &unique.auth {
            UniqueAuthConfig::ClusterLocal {
                service_extra_headers,
            } => {
                if !SMEARED_HEADER_KEYS
                    .iter()
                    .all(|h| service_extra_headers.contains_key(*h))
                {
                    return Err(SyncError::InvalidConfig(
                        "service_extra_headers must contain x-company-id and x-user-id headers"
                            .to_string(),
                    ));
                }
            }
            UniqueAuthConfig::External {
                zitadel_oauth_token_url,
                zitadel_client_id,
                ..
            } => {
                url::Url::parse(zitadel_oauth_token_url)?;
                validate_required("unique.zitadel_client_id", zitadel_client_id)?;
            }
        }

        let processing = &self.processing;
        validate_positive(
            "processing.step_timeout_seconds",
            processing.step_timeout_seconds,
        )?;
        validate_positive("processing.concurrency", processing.concurrency as u64)?;
        let fields = processing.scan_interval_cron.split_whitespace().count();
        if !(5..=6).contains(&fields) {
            return Err(SyncError::InvalidConfig(format!(
                "processing.scan_interval_cron '{}' must have 5 or 6 fields",
                processing.scan_interval_cron
            )));
        }
        // Parsed by the scheduler's own parser so a bad schedule fails at load.
        Job::new_async(processing.cron_expression().as_str(), |_id, _scheduler| {
            Box::pin(async {})
        })
        .map_err(|e| {
            SyncError::InvalidConfig(format!(
                "processing.scan_interval_cron '{}' is not a valid cron expression: {}",
                processing.scan_interval_cron, e
            ))
        })?;
        if let Some(max) = processing.max_pages_to_scan {
            validate_positive("processing.max_pages_to_scan", max as u64)?;
        }

        let ingestion = &self.ingestion;
        if ingestion.ingestion_mode != IngestionMode::Flat {
            return Err(SyncError::InvalidConfig(
                "ingestion.ingestion_mode 'recursive' is not supported; use 'flat'".to_string(),
            ));
        }
        validate_required("ingestion.scope_id", &ingestion.scope_id)?;

        Ok(())
    }
}

/// A tenant config paired with the name taken from its file.
#[derive(Debug, Clone)]
pub struct NamedTenantConfig {
    pub name: String,
    pub config: Arc<TenantConfig>,
}

// =============================================================================
// Loader
// =============================================================================

static TENANT_CONFIGS: OnceLock<Vec<NamedTenantConfig>> = OnceLock::new();

/// Loads active tenant configs once per process from `TENANT_CONFIG_PATH_PATTERN`.
pub fn get_tenant_configs() -> SyncResult<Vec<NamedTenantConfig>> {
    if let Some(cached) = TENANT_CONFIGS.get() {
        return Ok(cached.clone());
    }

    let pattern = std::env::var(TENANT_CONFIG_PATH_ENV).map_err(|_| SyncError::MissingEnvVar {
        name: TENANT_CONFIG_PATH_ENV.to_string(),
    })?;
    let loaded = load_tenant_configs(&pattern)?;

    Ok(TENANT_CONFIGS.get_or_init(|| loaded).clone())
}

/// Loads and validates every tenant config matching `pattern`.
///
/// Returns only active tenants. Any invalid file fails the whole load.
pub fn load_tenant_configs(pattern: &str) -> SyncResult<Vec<NamedTenantConfig>> {
    let files = find_config_files(pattern)?;
    if files.is_empty() {
        return Err(SyncError::ConfigLoadFailed(format!(
            "No tenant configuration files found matching pattern '{}'",
            pattern
        )));
    }

    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let name = extract_tenant_name(&path)?;
        entries.push((name, path));
    }
    validate_tenant_names(&entries)?;

    let mut active = Vec::new();
    for (name, path) in entries {
        let loaded = load_tenant_file(&name, &path).map_err(|e| SyncError::TenantConfigFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(config) = loaded {
            info!(tenant = %name, path = %path.display(), "Loaded tenant config");
            active.push(NamedTenantConfig {
                name,
                config: Arc::new(config),
            });
        }
    }

    if active.is_empty() {
        return Err(SyncError::NoActiveTenants);
    }

    Ok(active)
}

/// Reads one file. `Ok(None)` means the tenant is deleted or inactive.
fn load_tenant_file(name: &str, path: &Path) -> SyncResult<Option<TenantConfig>> {
    let content = std::fs::read_to_string(path)?;
    let mut document: toml::Value = toml::from_str(&content)?;
    if !document.is_table() {
        return Err(SyncError::InvalidConfig(
            "expected a table at the document root".to_string(),
        ));
    }

    let status = match document.get("status") {
        None => TenantStatus::default(),
        Some(toml::Value::String(s)) => s.parse()?,
        Some(other) => {
            return Err(SyncError::InvalidConfig(format!(
                "status must be a string, got {}",
                other.type_str()
            )))
        }
    };

    if status == TenantStatus::Deleted {
        info!(tenant = %name, "Tenant is deleted, skipping");
        return Ok(None);
    }

    resolve_env_placeholders(&mut document)?;
    let config: TenantConfig = document.try_into()?;
    config.validate()?;

    if status == TenantStatus::Inactive {
        info!(tenant = %name, "Tenant is inactive, skipping");
        return Ok(None);
    }

    Ok(Some(config))
}

/// Replaces every `os.environ/NAME` string in the document with `$NAME`.
pub fn resolve_env_placeholders(value: &mut toml::Value) -> SyncResult<()> {
    match value {
        toml::Value::String(s) => {
            if let Some(var) = s.strip_prefix(ENV_PLACEHOLDER_PREFIX) {
                let resolved = std::env::var(var).map_err(|_| SyncError::MissingEnvVar {
                    name: var.to_string(),
                })?;
                *s = resolved;
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                resolve_env_placeholders(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                resolve_env_placeholders(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn extract_tenant_name(path: &Path) -> SyncResult<String> {
    let file_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or_default();
    file_name
        .strip_suffix(TENANT_CONFIG_SUFFIX)
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::InvalidConfig(format!(
                "Tenant config filename '{}' does not end with '{}'",
                file_name, TENANT_CONFIG_SUFFIX
            ))
        })
}

/// All names are validated before duplicates are checked.
fn validate_tenant_names(entries: &[(String, PathBuf)]) -> SyncResult<()> {
    for (name, path) in entries {
        validate_tenant_name(name).map_err(|e| SyncError::InvalidTenantName {
            name: name.clone(),
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    }

    let mut seen: BTreeMap<&str, &PathBuf> = BTreeMap::new();
    for (name, path) in entries {
        if let Some(first) = seen.insert(name.as_str(), path) {
            return Err(SyncError::DuplicateTenant {
                name: name.clone(),
                first: first.display().to_string(),
                second: path.display().to_string(),
            });
        }
    }
    Ok(())
}

fn find_config_files(pattern: &str) -> SyncResult<Vec<PathBuf>> {
    let matcher = build_globset(pattern)?;
    let root = glob_root(pattern);
    debug!(pattern, root = %root.display(), "Scanning for tenant configs");

    let mut files: Vec<PathBuf> = WalkDir::new(&root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| matcher.is_match(path))
        .collect();
    files.sort();
    Ok(files)
}

fn build_globset(pattern: &str) -> SyncResult<GlobSet> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| SyncError::InvalidConfig(format!("Invalid glob '{}': {}", pattern, e)))?;
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    builder
        .build()
        .map_err(|e| SyncError::InvalidConfig(format!("Invalid glob '{}': {}", pattern, e)))
}

/// Longest leading directory of `pattern` that contains no glob syntax.
fn glob_root(pattern: &str) -> PathBuf {
    let mut root = PathBuf::new();
    let path = Path::new(pattern);
    let components: Vec<_> = path.components().collect();
    for (idx, component) in components.iter().enumerate() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) || idx == components.len() - 1 {
            break;
        }
        root.push(component.as_os_str());
    }
    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Err(serde::de::Error::custom("secret must not be empty"));
    }
    Ok(SecretString::from(raw))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) const CLOUD_CONFIG: &str = r#"
[confluence]
instance_type = "cloud"
base_url = "https://acme.atlassian.net"
cloud_id = "cloud-1"
ingest_single_label = "ai-ingest"
ingest_all_label = "ai-ingest-all"

[confluence.auth]
mode = "oauth_2lo"
client_id = "client"
client_secret = "os.environ/TEST_CONFLUENCE_CLIENT_SECRET"

[unique]
service_auth_mode = "cluster_local"
ingestion_service_base_url = "http://ingestion:8091"
scope_management_service_base_url = "http://scope:8094"

[unique.service_extra_headers]
x-company-id = "company-12345"
x-user-id = "user-67890"

[processing]
concurrency = 2
scan_interval_cron = "*/15 * * * *"

[ingestion]
scope_id = "scope_root"
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn pattern(dir: &Path) -> String {
        format!("{}/*-tenant-config.toml", dir.display())
    }

    #[test]
    fn test_tenant_status_parsing() {
        assert_eq!("active".parse::<TenantStatus>().unwrap(), TenantStatus::Active);
        assert_eq!("deleted".parse::<TenantStatus>().unwrap(), TenantStatus::Deleted);
        assert!("archived".parse::<TenantStatus>().is_err());
    }

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("*/15 * * * *"), "0 */15 * * * *");
        assert_eq!(normalize_cron("30 */15 * * * *"), "30 */15 * * * *");
    }

    #[test]
    fn test_smear() {
        assert_eq!(smear("company-12345"), "*********2345");
        assert_eq!(smear("abc"), "***");
    }

    #[test]
    fn test_loads_active_tenant_with_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("TEST_CONFLUENCE_CLIENT_SECRET", "env-client-secret");
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "acme-corp-tenant-config.toml", CLOUD_CONFIG);

        let configs = load_tenant_configs(&pattern(dir.path())).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "acme-corp");

        let config = &configs[0].config;
        assert_eq!(config.confluence.api_rate_limit_per_minute, 100);
        assert_eq!(config.unique.api_rate_limit_per_minute, 1000);
        assert_eq!(config.processing.step_timeout_seconds, 300);
        assert_eq!(config.ingestion.ingestion_mode, IngestionMode::Flat);
        assert!(!config.ingestion.file_ingestion_enabled());
        match &config.confluence.auth {
            ConfluenceAuthConfig::OAuth2Lo { client_secret, .. } => {
                assert_eq!(client_secret.expose_secret(), "env-client-secret");
            }
            other => panic!("unexpected auth mode {:?}", other),
        }

        let debug = format!("{:?}", config);
        assert!(!debug.contains("env-client-secret"));
        assert!(!debug.contains("company-12345"));
        assert!(debug.contains("2345"));
    }

    #[test]
    fn test_missing_env_placeholder_fails_load() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::remove_var("TEST_CONFLUENCE_CLIENT_SECRET");
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "acme-tenant-config.toml", CLOUD_CONFIG);

        let err = load_tenant_configs(&pattern(dir.path())).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&format!(
            "Failed to load or validate tenant config from {}",
            path.display()
        )));
        assert!(message.contains("TEST_CONFLUENCE_CLIENT_SECRET"));
    }

    #[test]
    fn test_deleted_tenant_skips_validation() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("TEST_CONFLUENCE_CLIENT_SECRET", "s");
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "acme-tenant-config.toml", CLOUD_CONFIG);
        write(
            dir.path(),
            "gone-tenant-config.toml",
            "status = \"deleted\"\n[confluence]\nnonsense = true\n",
        );

        let configs = load_tenant_configs(&pattern(dir.path())).unwrap();
        let names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["acme"]);
    }

    #[test]
    fn test_inactive_tenant_is_validated_then_skipped() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("TEST_CONFLUENCE_CLIENT_SECRET", "s");
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "acme-tenant-config.toml",
            &format!("status = \"inactive\"\n{}", CLOUD_CONFIG),
        );

        let err = load_tenant_configs(&pattern(dir.path())).unwrap_err();
        assert!(matches!(err, SyncError::NoActiveTenants));

        write(
            dir.path(),
            "broken-tenant-config.toml",
            "status = \"inactive\"\n[confluence]\nnonsense = true\n",
        );
        let err = load_tenant_configs(&pattern(dir.path())).unwrap_err();
        assert!(matches!(err, SyncError::TenantConfigFile { .. }));
    }

    #[test]
    fn test_invalid_and_duplicate_tenant_names() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Acme-tenant-config.toml", CLOUD_CONFIG);
        let err = load_tenant_configs(&pattern(dir.path())).unwrap_err();
        assert!(err.to_string().contains("Invalid tenant name 'Acme'"));

        let a = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(a.path().join("one")).unwrap();
        std::fs::create_dir_all(a.path().join("two")).unwrap();
        write(&a.path().join("one"), "acme-tenant-config.toml", CLOUD_CONFIG);
        write(&a.path().join("two"), "acme-tenant-config.toml", CLOUD_CONFIG);
        let err = load_tenant_configs(&format!("{}/*/*-tenant-config.toml", a.path().display()))
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateTenant { .. }));
    }

    #[test]
    fn test_no_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tenant_configs(&pattern(dir.path())).unwrap_err();
        assert!(err.to_string().contains("No tenant configuration files found"));
    }

    #[test]
    fn test_bad_suffix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "acme.toml", CLOUD_CONFIG);
        let err = load_tenant_configs(&format!("{}/*.toml", dir.path().display())).unwrap_err();
        assert!(err.to_string().contains("does not end with '-tenant-config.toml'"));
    }

    #[test]
    fn test_unparseable_cron_is_rejected_at_load() {
        let valid = CLOUD_CONFIG.replace(
            "client_secret = \"os.environ/TEST_CONFLUENCE_CLIENT_SECRET\"",
            "client_secret = \"s\"",
        );
        assert!(TenantConfig::from_toml_str(&valid).is_ok());

        for cron in ["*/15 * * * MONDAYS", "99 * * * *", "every 15 minutes"] {
            let config = valid.replace(
                "scan_interval_cron = \"*/15 * * * *\"",
                &format!("scan_interval_cron = \"{}\"", cron),
            );
            let err = TenantConfig::from_toml_str(&config).unwrap_err();
            assert!(matches!(err, SyncError::InvalidConfig(_)), "{}", cron);
            assert!(err.to_string().contains("scan_interval_cron"), "{}", cron);
        }
    }

    #[test]
    fn test_pat_with_cloud_is_rejected() {
        let config = CLOUD_CONFIG
            .replace("mode = \"oauth_2lo\"", "mode = \"pat\"\ntoken = \"t\"")
            .replace("client_id = \"client\"\n", "")
            .replace(
                "client_secret = \"os.environ/TEST_CONFLUENCE_CLIENT_SECRET\"\n",
                "",
            );
        let err = TenantConfig::from_toml_str(&config).unwrap_err();
        assert!(err.to_string().contains("only supported for data-center"));
    }

    #[test]
    fn test_cluster_local_requires_identity_headers() {
        let config = CLOUD_CONFIG
            .replace("client_secret = \"os.environ/TEST_CONFLUENCE_CLIENT_SECRET\"", "client_secret = \"s\"")
            .replace("x-user-id = \"user-67890\"\n", "");
        let err = TenantConfig::from_toml_str(&config).unwrap_err();
        assert!(err.to_string().contains("x-company-id and x-user-id"));
    }

    #[test]
    fn test_external_unique_auth_and_recursive_mode() {
        let config = CLOUD_CONFIG
            .replace("client_secret = \"os.environ/TEST_CONFLUENCE_CLIENT_SECRET\"", "client_secret = \"s\"")
            .replace(
                "service_auth_mode = \"cluster_local\"",
                "service_auth_mode = \"external\"\nzitadel_oauth_token_url = \"https://idp.example.com/oauth/v2/token\"\nzitadel_project_id = \"p\"\nzitadel_client_id = \"c\"\nzitadel_client_secret = \"z\"",
            )
            .replace(
                "[unique.service_extra_headers]\nx-company-id = \"company-12345\"\nx-user-id = \"user-67890\"\n",
                "",
            );
        let parsed = TenantConfig::from_toml_str(&config).unwrap();
        assert!(matches!(parsed.unique.auth, UniqueAuthConfig::External { .. }));

        let recursive = config.replace(
            "[ingestion]\n",
            "[ingestion]\ningestion_mode = \"recursive\"\n",
        );
        let err = TenantConfig::from_toml_str(&recursive).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
