//! In-memory fakes of the Confluence and Unique clients.
//!
//! Each fake records the calls it receives so tests can assert on the exact
//! requests a service made.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use confluence_core::FileDiffItem;
use serde_json::json;

use crate::confluence::tests::page_json;
use crate::confluence::{ConfluenceApi, ConfluencePage};
use crate::error::{SyncError, SyncResult};
use crate::unique::{
    ContentNode, ContentRegistration, FileDiffResponse, RegisteredContent, Scope, ScopeAccess,
    UniqueFiles, UniqueIngestion, UniqueScopes, UniqueUsers,
};

pub(crate) const FAKE_BASE_URL: &str = "https://acme.atlassian.net";

/// Builds a page with the shared fixture shape.
pub(crate) fn page(id: &str, content_type: &str, labels: &[&str]) -> ConfluencePage {
    serde_json::from_value(page_json(id, content_type, labels)).unwrap()
}

/// Builds a page that carries a storage body.
pub(crate) fn page_with_body(id: &str, labels: &[&str], body: &str) -> ConfluencePage {
    let mut value = page_json(id, "page", labels);
    value["body"] = json!({ "storage": { "value": body } });
    serde_json::from_value(value).unwrap()
}

// =============================================================================
// Confluence
// =============================================================================

#[derive(Default)]
pub(crate) struct FakeConfluence {
    search_results: Vec<ConfluencePage>,
    descendants: Vec<ConfluencePage>,
    descendants_fail: bool,
    pages: HashMap<String, SyncResult<Option<ConfluencePage>>>,
    get_delay: Option<Duration>,
    hanging_pages: HashSet<String>,
    pub descendant_calls: Mutex<Vec<Vec<String>>>,
    pub get_calls: Mutex<Vec<String>>,
}

impl FakeConfluence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, pages: Vec<ConfluencePage>) -> Self {
        self.search_results = pages;
        self
    }

    pub fn with_descendants(mut self, pages: Vec<ConfluencePage>) -> Self {
        self.descendants = pages;
        self
    }

    pub fn failing_descendants(mut self) -> Self {
        self.descendants_fail = true;
        self
    }

    pub fn with_page(mut self, page: ConfluencePage) -> Self {
        self.pages.insert(page.id.clone(), Ok(Some(page)));
        self
    }

    /// Every `get_page_by_id` takes `delay`.
    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    /// `get_page_by_id(id)` never returns.
    pub fn with_hanging_page(mut self, id: &str) -> Self {
        self.hanging_pages.insert(id.to_string());
        self
    }

    pub fn with_page_error(mut self, id: &str) -> Self {
        self.pages.insert(
            id.to_string(),
            Err(SyncError::HttpStatus {
                url: format!("{}/rest/api/content/{}", FAKE_BASE_URL, id),
                status: 500,
                body: "Authorization: Bearer leaked-token".into(),
            }),
        );
        self
    }
}

#[async_trait]
impl ConfluenceApi for FakeConfluence {
    async fn search_pages_by_label(&self) -> SyncResult<Vec<ConfluencePage>> {
        Ok(self.search_results.clone())
    }

    async fn get_page_by_id(&self, page_id: &str) -> SyncResult<Option<ConfluencePage>> {
        self.get_calls.lock().unwrap().push(page_id.to_string());
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if self.hanging_pages.contains(page_id) {
            std::future::pending::<()>().await;
        }
        self.pages.get(page_id).cloned().unwrap_or(Ok(None))
    }

    async fn get_descendant_pages(&self, root_ids: &[String]) -> SyncResult<Vec<ConfluencePage>> {
        self.descendant_calls.lock().unwrap().push(root_ids.to_vec());
        if self.descendants_fail {
            return Err(SyncError::Http("connection reset".into()));
        }
        Ok(self.descendants.clone())
    }

    fn build_page_web_url(&self, page: &ConfluencePage) -> String {
        format!(
            "{}/wiki{}",
            FAKE_BASE_URL,
            page.links.webui.clone().unwrap_or_default()
        )
    }

    fn base_url(&self) -> &str {
        FAKE_BASE_URL
    }
}

// =============================================================================
// Unique
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct DiffCall {
    pub items: Vec<FileDiffItem>,
    pub partial_key: String,
    pub source_kind: String,
    pub source_name: String,
}

#[derive(Default)]
pub(crate) struct UniqueState {
    pub user_id: String,
    pub diff_response: FileDiffResponse,
    /// Answer diffs by comparing the manifest with `content`, like the real service.
    pub diff_from_content: bool,
    pub diff_calls: Vec<DiffCall>,
    pub fail_register_keys: HashSet<String>,
    /// Base of generated write URLs; point it at a mock blob server.
    pub upload_base: String,
    pub registrations: Vec<ContentRegistration>,
    pub finalized: Vec<(String, String)>,
    pub scopes: HashMap<String, Scope>,
    pub created_paths: Vec<Vec<String>>,
    pub accesses: Vec<(String, Vec<ScopeAccess>, bool)>,
    pub content: Vec<ContentNode>,
    pub deleted_batches: Vec<Vec<String>>,
}

pub(crate) struct FakeUnique {
    state: Mutex<UniqueState>,
}

impl FakeUnique {
    /// Root scope `scope_root` ("Confluence") under `scope_company` ("Company").
    pub fn new() -> Self {
        let mut state = UniqueState {
            user_id: "user_1".into(),
            ..UniqueState::default()
        };
        state.scopes.insert(
            "scope_company".into(),
            Scope {
                id: "scope_company".into(),
                name: "Company".into(),
                parent_id: None,
                external_id: None,
            },
        );
        state.scopes.insert(
            "scope_root".into(),
            Scope {
                id: "scope_root".into(),
                name: "Confluence".into(),
                parent_id: Some("scope_company".into()),
                external_id: None,
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, UniqueState> {
        self.state.lock().unwrap()
    }

    pub fn with_diff(self, response: FileDiffResponse) -> Self {
        self.state().diff_response = response;
        self
    }

    pub fn with_upload_base(self, base: &str) -> Self {
        self.state().upload_base = base.to_string();
        self
    }

    /// Diffs against stored content; finalized items become stored content.
    pub fn with_computed_diff(self) -> Self {
        self.state().diff_from_content = true;
        self
    }

    pub fn with_content(self, keys: &[&str]) -> Self {
        self.add_content(keys);
        self
    }

    pub fn add_content(&self, keys: &[&str]) {
        let mut state = self.state();
        for key in keys {
            let id = format!("cont_{}", state.content.len());
            state.content.push(ContentNode {
                id,
                key: key.to_string(),
            });
        }
    }
}

#[async_trait]
impl UniqueIngestion for FakeUnique {
    async fn register_content(&self, request: &ContentRegistration) -> SyncResult<RegisteredContent> {
        let mut state = self.state();
        if state.fail_register_keys.contains(&request.key) {
            return Err(SyncError::HttpStatus {
                url: "ingestion/graphql".into(),
                status: 500,
                body: "registration failed".into(),
            });
        }
        state.registrations.push(request.clone());
        let n = state.registrations.len();
        Ok(RegisteredContent {
            id: format!("cont_{}", n),
            key: request.key.clone(),
            write_url: format!("{}/blob/{}", state.upload_base, n),
            read_url: format!("https://blob.example.com/read/{}", n),
        })
    }

    async fn finalize_ingestion(&self, request: &ContentRegistration, file_url: &str) -> SyncResult<String> {
        let mut state = self.state();
        state
            .finalized
            .push((request.key.clone(), file_url.to_string()));
        if state.diff_from_content && !state.content.iter().any(|c| c.key == request.key) {
            let id = format!("cont_{}", state.content.len());
            state.content.push(ContentNode {
                id,
                key: request.key.clone(),
            });
        }
        Ok(format!("cont_final_{}", state.finalized.len()))
    }

    async fn perform_file_diff(
        &self,
        items: &[FileDiffItem],
        partial_key: &str,
        source_kind: &str,
        source_name: &str,
    ) -> SyncResult<FileDiffResponse> {
        let mut state = self.state();
        state.diff_calls.push(DiffCall {
            items: items.to_vec(),
            partial_key: partial_key.to_string(),
            source_kind: source_kind.to_string(),
            source_name: source_name.to_string(),
        });
        if !state.diff_from_content {
            return Ok(state.diff_response.clone());
        }

        let prefix = format!("{}/", partial_key);
        let stored: HashSet<&str> = state
            .content
            .iter()
            .filter_map(|c| c.key.strip_prefix(&prefix))
            .collect();
        let submitted: HashSet<&str> = items.iter().map(|i| i.key.as_str()).collect();
        Ok(FileDiffResponse {
            new_files: items
                .iter()
                .filter(|i| !stored.contains(i.key.as_str()))
                .map(|i| i.key.clone())
                .collect(),
            updated_files: vec![],
            moved_files: vec![],
            deleted_files: state
                .content
                .iter()
                .filter_map(|c| c.key.strip_prefix(&prefix))
                .filter(|k| !submitted.contains(k))
                .map(str::to_string)
                .collect(),
        })
    }
}

#[async_trait]
impl UniqueScopes for FakeUnique {
    async fn get_by_id(&self, id: &str) -> SyncResult<Option<Scope>> {
        Ok(self.state().scopes.get(id).cloned())
    }

    async fn get_by_external_id(&self, external_id: &str) -> SyncResult<Option<Scope>> {
        Ok(self
            .state()
            .scopes
            .values()
            .find(|s| s.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create_from_paths(&self, paths: &[String], _inherit_access: bool) -> SyncResult<Vec<Scope>> {
        let mut state = self.state();
        state.created_paths.push(paths.to_vec());
        let mut created = Vec::new();
        for path in paths {
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            let scope = Scope {
                id: format!("scope_{}", name.to_lowercase()),
                name,
                parent_id: Some("scope_root".into()),
                external_id: None,
            };
            state.scopes.insert(scope.id.clone(), scope.clone());
            created.push(scope);
        }
        Ok(created)
    }

    async fn update_external_id(&self, scope_id: &str, external_id: &str) -> SyncResult<Scope> {
        let mut state = self.state();
        let scope = state
            .scopes
            .get_mut(scope_id)
            .ok_or_else(|| SyncError::InvalidResponse(format!("no scope {}", scope_id)))?;
        scope.external_id = Some(external_id.to_string());
        Ok(scope.clone())
    }

    async fn create_accesses(
        &self,
        scope_id: &str,
        accesses: &[ScopeAccess],
        apply_to_sub_scopes: bool,
    ) -> SyncResult<()> {
        self.state()
            .accesses
            .push((scope_id.to_string(), accesses.to_vec(), apply_to_sub_scopes));
        Ok(())
    }
}

#[async_trait]
impl UniqueFiles for FakeUnique {
    async fn get_by_keys(&self, keys: &[String]) -> SyncResult<Vec<ContentNode>> {
        Ok(self
            .state()
            .content
            .iter()
            .filter(|c| keys.contains(&c.key))
            .cloned()
            .collect())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> SyncResult<usize> {
        let mut state = self.state();
        state.deleted_batches.push(ids.to_vec());
        state.content.retain(|c| !ids.contains(&c.id));
        Ok(ids.len())
    }
}

#[async_trait]
impl UniqueUsers for FakeUnique {
    async fn current_user_id(&self) -> SyncResult<String> {
        Ok(self.state().user_id.clone())
    }
}
