//! # Unique API Client
//!
//! Downstream ingestion and scope management, consumed through four narrow
//! traits so sync services can be tested against in-memory fakes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         UniqueApiClient                                 │
//! │                                                                         │
//! │  UniqueIngestion   contentUpsert (register / finalize)   ─┐             │
//! │                    POST /v2/content/file-diff (REST)      │ ingestion   │
//! │  UniqueFiles       paginatedContent, contentDeleteBy..   ─┘ service     │
//! │                                                                         │
//! │  UniqueScopes      paginatedScope, generateScopes..,     ─┐ scope       │
//! │                    updateScope, createScopeAccesses       │ management  │
//! │  UniqueUsers       me                                    ─┘ service     │
//! │                                                                         │
//! │  GraphQL: POST {base}/graphql { query, variables }                     │
//! │           non-empty `errors` → SyncError::GraphQl                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use confluence_core::FileDiffItem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::auth::UniqueAuth;
use crate::error::{SyncError, SyncResult};
use crate::http::RateLimitedHttpClient;

/// Page size for `paginatedContent` lookups.
pub const CONTENT_PAGE_SIZE: usize = 100;

// =============================================================================
// Types
// =============================================================================

/// A scope (folder) in Unique.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Permission granted on a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeAccessType {
    Manage,
    Read,
    Write,
}

/// Grant of one access type to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeAccess {
    pub access_type: ScopeAccessType,
    pub entity_id: String,
    pub entity_type: &'static str,
}

impl ScopeAccess {
    pub fn user(access_type: ScopeAccessType, user_id: &str) -> Self {
        Self {
            access_type,
            entity_id: user_id.to_string(),
            entity_type: "USER",
        }
    }
}

/// Content registration, also reused for finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRegistration {
    pub key: String,
    pub title: String,
    pub mime_type: String,
    pub owner_type: String,
    pub scope_id: String,
    pub source_owner_type: String,
    pub source_kind: String,
    pub source_name: String,
    pub url: Option<String>,
    pub base_url: Option<String>,
    pub byte_size: u64,
    pub metadata: serde_json::Value,
    pub store_internally: bool,
    pub ingestion_config: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Response of a registration: where to upload and where to read back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredContent {
    pub id: String,
    #[serde(default)]
    pub key: String,
    pub write_url: String,
    pub read_url: String,
}

/// Ingested content as returned by `paginatedContent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNode {
    pub id: String,
    pub key: String,
}

/// Raw key lists returned by the file-diff endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiffResponse {
    #[serde(default)]
    pub new_files: Vec<String>,
    #[serde(default)]
    pub updated_files: Vec<String>,
    #[serde(default)]
    pub moved_files: Vec<String>,
    #[serde(default)]
    pub deleted_files: Vec<String>,
}

// =============================================================================
// Traits
// =============================================================================

#[async_trait]
pub trait UniqueIngestion: Send + Sync {
    async fn register_content(&self, request: &ContentRegistration) -> SyncResult<RegisteredContent>;

    /// Completes ingestion of uploaded bytes, returning the content id.
    async fn finalize_ingestion(&self, request: &ContentRegistration, file_url: &str) -> SyncResult<String>;

    async fn perform_file_diff(
        &self,
        items: &[FileDiffItem],
        partial_key: &str,
        source_kind: &str,
        source_name: &str,
    ) -> SyncResult<FileDiffResponse>;
}

#[async_trait]
pub trait UniqueScopes: Send + Sync {
    async fn get_by_id(&self, id: &str) -> SyncResult<Option<Scope>>;

    async fn get_by_external_id(&self, external_id: &str) -> SyncResult<Option<Scope>>;

    async fn create_from_paths(&self, paths: &[String], inherit_access: bool) -> SyncResult<Vec<Scope>>;

    async fn update_external_id(&self, scope_id: &str, external_id: &str) -> SyncResult<Scope>;

    async fn create_accesses(
        &self,
        scope_id: &str,
        accesses: &[ScopeAccess],
        apply_to_sub_scopes: bool,
    ) -> SyncResult<()>;
}

#[async_trait]
pub trait UniqueFiles: Send + Sync {
    async fn get_by_keys(&self, keys: &[String]) -> SyncResult<Vec<ContentNode>>;

    /// Deletes content by id, returning how many were deleted.
    async fn delete_by_ids(&self, ids: &[String]) -> SyncResult<usize>;
}

#[async_trait]
pub trait UniqueUsers: Send + Sync {
    async fn current_user_id(&self) -> SyncResult<String>;
}

// =============================================================================
// GraphQL Documents
// =============================================================================

const PAGINATED_SCOPE_QUERY: &str = "query PaginatedScope($skip: Int!, $take: Int!, $where: ScopeWhereInput!) {
  paginatedScope(skip: $skip, take: $take, where: $where) {
    totalCount
    nodes { id name parentId externalId }
  }
}";

const GENERATE_SCOPES_MUTATION: &str = "mutation GenerateScopesBasedOnPaths($paths: [String!]!, $inheritAccess: Boolean) {
  generateScopesBasedOnPaths(paths: $paths, inheritAccess: $inheritAccess) { id name parentId externalId }
}";

const UPDATE_SCOPE_MUTATION: &str = "mutation UpdateScope($id: String!, $input: ScopeUpdateInput!) {
  updateScope(id: $id, input: $input) { id name externalId parentId }
}";

const CREATE_SCOPE_ACCESSES_MUTATION: &str = "mutation CreateScopeAccesses($scopeAccesses: [ScopeAccessChangeDto!]!, $scopeId: String!, $applyToSubScopes: Boolean) {
  createScopeAccesses(scopeAccesses: $scopeAccesses, scopeId: $scopeId, applyToSubScopes: $applyToSubScopes)
}";

const ME_QUERY: &str = "query Me { me { user { id } } }";

const CONTENT_UPSERT_MUTATION: &str = "mutation ContentUpsert($input: ContentCreateInput!, $fileUrl: String, $scopeId: String, $sourceOwnerType: String, $sourceName: String, $sourceKind: String, $storeInternally: Boolean, $baseUrl: String) {
  contentUpsert(input: $input, fileUrl: $fileUrl, scopeId: $scopeId, sourceOwnerType: $sourceOwnerType, sourceName: $sourceName, sourceKind: $sourceKind, storeInternally: $storeInternally, baseUrl: $baseUrl) {
    id key byteSize mimeType ownerType ownerId writeUrl readUrl createdAt internallyStoredAt
  }
}";

const PAGINATED_CONTENT_QUERY: &str = "query PaginatedContent($skip: Int!, $take: Int!, $where: ContentWhereInput) {
  paginatedContent(skip: $skip, take: $take, where: $where) {
    nodes { id key }
    totalCount
  }
}";

const CONTENT_DELETE_BY_IDS_MUTATION: &str = "mutation ContentDeleteByContentIds($contentIds: [String!]!) {
  contentDeleteByContentIds(contentIds: $contentIds) { id }
}";

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopePage {
    paginated_scope: NodeList<Scope>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentPage {
    paginated_content: NodeList<ContentNode>,
}

#[derive(Deserialize)]
struct NodeList<T> {
    nodes: Vec<T>,
}

// =============================================================================
// Client
// =============================================================================

/// GraphQL + REST client for one tenant's Unique services.
pub struct UniqueApiClient {
    http: Arc<RateLimitedHttpClient>,
    auth: Arc<dyn UniqueAuth>,
    ingestion_base_url: String,
    scope_management_base_url: String,
}

impl UniqueApiClient {
    pub fn new(
        http: Arc<RateLimitedHttpClient>,
        auth: Arc<dyn UniqueAuth>,
        ingestion_base_url: impl Into<String>,
        scope_management_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth,
            ingestion_base_url: ingestion_base_url.into(),
            scope_management_base_url: scope_management_base_url.into(),
        }
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        base_url: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> SyncResult<T> {
        let headers = self.auth.headers().await?;
        let url = format!("{}/graphql", base_url);
        let body = json!({ "query": query, "variables": variables });
        let response: GraphQlResponse<T> = self.http.post_json(&url, &headers, &body).await?;

        if !response.errors.is_empty() {
            let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(SyncError::GraphQl(messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| SyncError::InvalidResponse(format!("{}: GraphQL response without data", url)))
    }

    async fn find_scope(&self, filter: serde_json::Value) -> SyncResult<Option<Scope>> {
        let page: ScopePage = self
            .graphql(
                &self.scope_management_base_url,
                PAGINATED_SCOPE_QUERY,
                json!({ "skip": 0, "take": 1, "where": filter }),
            )
            .await?;
        Ok(page.paginated_scope.nodes.into_iter().next())
    }

    async fn content_upsert(
        &self,
        request: &ContentRegistration,
        file_url: Option<&str>,
    ) -> SyncResult<serde_json::Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Upsert {
            content_upsert: Option<serde_json::Value>,
        }

        let mut input = json!({
            "key": request.key,
            "title": request.title,
            "mimeType": request.mime_type,
            "ownerType": request.owner_type,
            "url": request.url,
            "byteSize": request.byte_size,
            "metadata": request.metadata,
        });
        if let Some(config) = &request.ingestion_config {
            input["ingestionConfig"] = serde_json::Value::Object(config.clone());
        }

        let mut variables = json!({
            "input": input,
            "scopeId": request.scope_id,
            "sourceOwnerType": request.source_owner_type,
            "sourceKind": request.source_kind,
            "sourceName": request.source_name,
            "storeInternally": request.store_internally,
            "baseUrl": request.base_url,
        });
        if let Some(file_url) = file_url {
            variables["fileUrl"] = json!(file_url);
        }

        let result: Upsert = self
            .graphql(&self.ingestion_base_url, CONTENT_UPSERT_MUTATION, variables)
            .await?;
        result.content_upsert.ok_or_else(|| {
            SyncError::InvalidResponse("Invalid response from Unique API content registration".to_string())
        })
    }
}

#[async_trait]
impl UniqueIngestion for UniqueApiClient {
    async fn register_content(&self, request: &ContentRegistration) -> SyncResult<RegisteredContent> {
        let raw = self.content_upsert(request, None).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn finalize_ingestion(&self, request: &ContentRegistration, file_url: &str) -> SyncResult<String> {
        let raw = self.content_upsert(request, Some(file_url)).await?;
        raw.get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                SyncError::InvalidResponse("Invalid response from Unique API ingestion finalization".to_string())
            })
    }

    async fn perform_file_diff(
        &self,
        items: &[FileDiffItem],
        partial_key: &str,
        source_kind: &str,
        source_name: &str,
    ) -> SyncResult<FileDiffResponse> {
        let headers = self.auth.headers().await?;
        let url = format!("{}/v2/content/file-diff", self.ingestion_base_url);
        let body = json!({
            "partialKey": partial_key,
            "sourceKind": source_kind,
            "sourceName": source_name,
            "fileList": items,
        });
        debug!(items = items.len(), "Submitting file diff");
        self.http.post_json(&url, &headers, &body).await
    }
}

#[async_trait]
impl UniqueScopes for UniqueApiClient {
    async fn get_by_id(&self, id: &str) -> SyncResult<Option<Scope>> {
        self.find_scope(json!({ "id": { "equals": id } })).await
    }

    async fn get_by_external_id(&self, external_id: &str) -> SyncResult<Option<Scope>> {
        self.find_scope(json!({ "externalId": { "equals": external_id } }))
            .await
    }

    async fn create_from_paths(&self, paths: &[String], inherit_access: bool) -> SyncResult<Vec<Scope>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Generated {
            generate_scopes_based_on_paths: Vec<Scope>,
        }

        let result: Generated = self
            .graphql(
                &self.scope_management_base_url,
                GENERATE_SCOPES_MUTATION,
                json!({ "paths": paths, "inheritAccess": inherit_access }),
            )
            .await?;
        Ok(result.generate_scopes_based_on_paths)
    }

    async fn update_external_id(&self, scope_id: &str, external_id: &str) -> SyncResult<Scope> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Updated {
            update_scope: Scope,
        }

        let result: Updated = self
            .graphql(
                &self.scope_management_base_url,
                UPDATE_SCOPE_MUTATION,
                json!({ "id": scope_id, "input": { "externalId": external_id } }),
            )
            .await?;
        Ok(result.update_scope)
    }

    async fn create_accesses(
        &self,
        scope_id: &str,
        accesses: &[ScopeAccess],
        apply_to_sub_scopes: bool,
    ) -> SyncResult<()> {
        let _: serde_json::Value = self
            .graphql(
                &self.scope_management_base_url,
                CREATE_SCOPE_ACCESSES_MUTATION,
                json!({
                    "scopeId": scope_id,
                    "scopeAccesses": accesses,
                    "applyToSubScopes": apply_to_sub_scopes,
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UniqueFiles for UniqueApiClient {
    async fn get_by_keys(&self, keys: &[String]) -> SyncResult<Vec<ContentNode>> {
        let mut nodes = Vec::new();
        let mut skip = 0;
        loop {
            let page: ContentPage = self
                .graphql(
                    &self.ingestion_base_url,
                    PAGINATED_CONTENT_QUERY,
                    json!({
                        "skip": skip,
                        "take": CONTENT_PAGE_SIZE,
                        "where": { "key": { "in": keys } },
                    }),
                )
                .await?;
            let count = page.paginated_content.nodes.len();
            nodes.extend(page.paginated_content.nodes);
            if count < CONTENT_PAGE_SIZE {
                break;
            }
            skip += CONTENT_PAGE_SIZE;
        }
        Ok(nodes)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> SyncResult<usize> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Deleted {
            content_delete_by_content_ids: Vec<serde_json::Value>,
        }

        let result: Deleted = self
            .graphql(
                &self.ingestion_base_url,
                CONTENT_DELETE_BY_IDS_MUTATION,
                json!({ "contentIds": ids }),
            )
            .await?;
        Ok(result.content_delete_by_content_ids.len())
    }
}

#[async_trait]
impl UniqueUsers for UniqueApiClient {
    async fn current_user_id(&self) -> SyncResult<String> {
        #[derive(Deserialize)]
        struct Me {
            me: MeUser,
        }
        #[derive(Deserialize)]
        struct MeUser {
            user: UserRef,
        }
        #[derive(Deserialize)]
        struct UserRef {
            id: String,
        }

        let result: Me = self
            .graphql(&self.scope_management_base_url, ME_QUERY, json!({}))
            .await?;
        Ok(result.me.user.id)
    }
}
