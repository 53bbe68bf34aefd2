//! # Scope Management Service
//!
//! Every Confluence space gets its own scope under the tenant's root scope.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Scope Layout                                    │
//! │                                                                         │
//! │  /Company                      READ granted to the service user         │
//! │    └── /Confluence  (root)     MANAGE + READ + WRITE, applied to subs   │
//! │          ├── /ENG              externalId = confc:{tenant}:ENG          │
//! │          └── /HR               externalId = confc:{tenant}:HR           │
//! │                                                                         │
//! │  ensure_space_scope(key):                                               │
//! │    cache ──► external id lookup ──► create_from_paths + set external id │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two runs racing to create the same space scope both end up with the scope
//! the path resolves to; the external id lookup finds it on the next call.

use std::collections::HashMap;
use std::sync::Arc;

use confluence_core::keys::space_external_id;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, Instrument};

use crate::error::{SyncError, SyncResult};
use crate::tenant;
use crate::unique::{ScopeAccess, ScopeAccessType, UniqueScopes, UniqueUsers};

/// Root scope resolved by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootScope {
    pub id: String,
    /// Slash-joined scope names from the top of the tree, e.g. `/Company/Confluence`.
    pub path: String,
}

pub struct ScopeManagementService {
    scopes: Arc<dyn UniqueScopes>,
    users: Arc<dyn UniqueUsers>,
    tenant_name: String,
    root_scope_id: String,
    root: OnceCell<RootScope>,
    /// Space key → scope id.
    cache: RwLock<HashMap<String, String>>,
}

impl ScopeManagementService {
    pub fn new(
        scopes: Arc<dyn UniqueScopes>,
        users: Arc<dyn UniqueUsers>,
        tenant_name: impl Into<String>,
        root_scope_id: impl Into<String>,
    ) -> Self {
        Self {
            scopes,
            users,
            tenant_name: tenant_name.into(),
            root_scope_id: root_scope_id.into(),
            root: OnceCell::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.root.initialized()
    }

    pub fn root(&self) -> Option<&RootScope> {
        self.root.get()
    }

    /// Grants the service user access to the root chain and resolves the root path.
    ///
    /// Runs once; later calls return the cached root.
    pub async fn initialize(&self) -> SyncResult<RootScope> {
        let root = self
            .root
            .get_or_try_init(|| self.resolve_root().instrument(tenant::service_span::<Self>()))
            .await?;
        Ok(root.clone())
    }

    async fn resolve_root(&self) -> SyncResult<RootScope> {
        let user_id = self.users.current_user_id().await?;

        let root_accesses = [
            ScopeAccess::user(ScopeAccessType::Manage, &user_id),
            ScopeAccess::user(ScopeAccessType::Read, &user_id),
            ScopeAccess::user(ScopeAccessType::Write, &user_id),
        ];
        self.scopes
            .create_accesses(&self.root_scope_id, &root_accesses, true)
            .await?;

        let root = self
            .scopes
            .get_by_id(&self.root_scope_id)
            .await?
            .ok_or_else(|| {
                SyncError::ScopeNotFound(format!("Root scope not found: {}", self.root_scope_id))
            })?;

        let mut segments = vec![root.name.clone()];
        let mut parent_id = root.parent_id.clone();
        while let Some(id) = parent_id {
            self.scopes
                .create_accesses(&id, &[ScopeAccess::user(ScopeAccessType::Read, &user_id)], false)
                .await?;
            let parent = self
                .scopes
                .get_by_id(&id)
                .await?
                .ok_or_else(|| SyncError::ScopeNotFound(format!("Parent scope not found: {}", id)))?;
            segments.push(parent.name.clone());
            parent_id = parent.parent_id;
        }

        segments.reverse();
        let path = format!("/{}", segments.join("/"));
        info!(root_scope_id = %root.id, path = %path, "Scope management initialized");

        Ok(RootScope { id: root.id, path })
    }

    /// Scope id for a space, creating the scope on first use.
    pub async fn ensure_space_scope(&self, space_key: &str) -> SyncResult<String> {
        if let Some(id) = self.cache.read().await.get(space_key) {
            return Ok(id.clone());
        }

        let external_id = space_external_id(&self.tenant_name, space_key);
        if let Some(scope) = self.scopes.get_by_external_id(&external_id).await? {
            debug!(space_key, scope_id = %scope.id, "Found existing space scope");
            self.remember(space_key, &scope.id).await;
            return Ok(scope.id);
        }

        let root = self.root.get().ok_or(SyncError::ScopeNotInitialized)?;
        let path = format!("{}/{}", root.path, space_key);
        let scope = self
            .scopes
            .create_from_paths(std::slice::from_ref(&path), true)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::ScopeCreation(path.clone()))?;

        self.scopes.update_external_id(&scope.id, &external_id).await?;
        info!(space_key, scope_id = %scope.id, path = %path, "Created space scope");

        self.remember(space_key, &scope.id).await;
        Ok(scope.id)
    }

    /// Batch variant of [`Self::ensure_space_scope`]: one creation call for
    /// every uncached space.
    pub async fn ensure_space_scopes(&self, space_keys: &[String]) -> SyncResult<HashMap<String, String>> {
        let root = self.root.get().ok_or(SyncError::ScopeNotInitialized)?;

        let mut resolved = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        {
            let cache = self.cache.read().await;
            for key in space_keys {
                match cache.get(key) {
                    Some(id) => {
                        resolved.insert(key.clone(), id.clone());
                    }
                    None if !missing.contains(key) => missing.push(key.clone()),
                    None => {}
                }
            }
        }

        if missing.is_empty() {
            return Ok(resolved);
        }

        let paths: Vec<String> = missing
            .iter()
            .map(|key| format!("{}/{}", root.path, key))
            .collect();
        let created = self.scopes.create_from_paths(&paths, true).await?;
        if created.len() != missing.len() {
            return Err(SyncError::ScopeCreation(format!(
                "requested {} scopes, got {}",
                missing.len(),
                created.len()
            )));
        }

        for (key, scope) in missing.iter().zip(created) {
            if scope.external_id.is_none() {
                self.scopes
                    .update_external_id(&scope.id, &space_external_id(&self.tenant_name, key))
                    .await?;
            }
            self.remember(key, &scope.id).await;
            resolved.insert(key.clone(), scope.id);
        }

        info!(created = missing.len(), "Ensured space scopes");
        Ok(resolved)
    }

    async fn remember(&self, space_key: &str, scope_id: &str) {
        self.cache
            .write()
            .await
            .insert(space_key.to_string(), scope_id.to_string());
    }
}
