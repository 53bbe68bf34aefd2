//! # Tenant Context
//!
//! Every sync run executes inside exactly one tenant's context.
//!
//! ## Context Propagation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Tenant Context Flow                                │
//! │                                                                         │
//! │  Scheduler tick ("sync:acme")                                           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  tenant::scope(ctx, async { orchestrator.synchronize().await })         │
//! │        │                                                                │
//! │        │   task-local CURRENT_TENANT = ctx                              │
//! │        ▼                                                                │
//! │  tenant::current()  ──► Arc<TenantContext>                              │
//! │        │                  ├── name, config                              │
//! │        │                  ├── services (type-keyed registry)            │
//! │        │                  ├── is_scanning (one run at a time)           │
//! │        │                  └── shutdown flag (process-wide)              │
//! │        ▼                                                                │
//! │  Outside any scope ──► SyncError::NoTenantContext                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The context is task-local, so a run must not `tokio::spawn` work that
//! needs it. Concurrency inside a run uses `futures` combinators on the same
//! task.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::Span;

use crate::config::TenantConfig;
use crate::error::{SyncError, SyncResult};

tokio::task_local! {
    static CURRENT_TENANT: Arc<TenantContext>;
}

// =============================================================================
// Service Registry
// =============================================================================

/// Per-tenant services keyed by their concrete type.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any previous one of the same type.
    pub fn register<T: Any + Send + Sync>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    /// Looks up a service by type.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

// =============================================================================
// Tenant Context
// =============================================================================

/// Runtime state of one loaded tenant.
pub struct TenantContext {
    /// Tenant name taken from the config file name.
    pub name: String,

    pub config: Arc<TenantConfig>,

    services: ServiceRegistry,

    /// True while a sync run for this tenant is in progress.
    is_scanning: AtomicBool,

    /// Shared with every other tenant.
    shutdown: Arc<AtomicBool>,
}

impl TenantContext {
    pub fn new(
        name: impl Into<String>,
        config: Arc<TenantConfig>,
        services: ServiceRegistry,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            services,
            is_scanning: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Returns the registered service of type `T`.
    pub fn service<T: Any + Send + Sync>(&self) -> SyncResult<Arc<T>> {
        self.services
            .get::<T>()
            .ok_or_else(|| SyncError::ServiceNotFound {
                tenant: self.name.clone(),
                service: short_type_name::<T>().to_string(),
            })
    }

    /// Marks a run as started. Returns `None` if one is already in progress.
    ///
    /// The flag is cleared when the returned guard is dropped, on every exit
    /// path of the run.
    pub fn try_begin_scan(self: &Arc<Self>) -> Option<ScanGuard> {
        self.is_scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScanGuard {
                context: Arc::clone(self),
            })
    }

    pub fn is_scanning(&self) -> bool {
        self.is_scanning.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext")
            .field("name", &self.name)
            .field("services", &self.services.len())
            .field("is_scanning", &self.is_scanning())
            .finish()
    }
}

/// Clears the tenant's scanning flag on drop.
pub struct ScanGuard {
    context: Arc<TenantContext>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.context.is_scanning.store(false, Ordering::Release);
    }
}

// =============================================================================
// Task-Local Access
// =============================================================================

/// Runs `fut` with `context` as the current tenant.
pub async fn scope<F>(context: Arc<TenantContext>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_TENANT.scope(context, fut).await
}

/// The tenant of the running sync, or `NoTenantContext` outside a scope.
pub fn current() -> SyncResult<Arc<TenantContext>> {
    CURRENT_TENANT
        .try_with(Arc::clone)
        .map_err(|_| SyncError::NoTenantContext)
}

/// Shorthand for `current()?.service::<T>()`.
pub fn service<T: Any + Send + Sync>() -> SyncResult<Arc<T>> {
    current()?.service::<T>()
}

/// Span carrying the current tenant and the component `T`.
pub fn service_span<T: ?Sized>() -> Span {
    let component = short_type_name::<T>();
    match current() {
        Ok(ctx) => tracing::info_span!("service", tenant = %ctx.name, component),
        Err(_) => tracing::info_span!("service", tenant = "none", component),
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// =============================================================================
// Tenant Registry
// =============================================================================

/// All active tenants, built once at startup.
pub struct TenantRegistry {
    tenants: Vec<Arc<TenantContext>>,
    shutdown: Arc<AtomicBool>,
}

impl TenantRegistry {
    pub fn new(tenants: Vec<Arc<TenantContext>>, shutdown: Arc<AtomicBool>) -> Self {
        Self { tenants, shutdown }
    }

    pub fn tenants(&self) -> &[Arc<TenantContext>] {
        &self.tenants
    }

    pub fn get(&self, name: &str) -> SyncResult<Arc<TenantContext>> {
        self.tenants
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownTenant(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Asks every tenant to stop at its next step boundary.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::CLOUD_CONFIG;

    pub(crate) fn test_config() -> Arc<TenantConfig> {
        let content = CLOUD_CONFIG.replace(
            "client_secret = \"os.environ/TEST_CONFLUENCE_CLIENT_SECRET\"",
            "client_secret = \"secret\"",
        );
        Arc::new(TenantConfig::from_toml_str(&content).unwrap())
    }

    pub(crate) fn test_context(name: &str, services: ServiceRegistry) -> Arc<TenantContext> {
        Arc::new(TenantContext::new(
            name,
            test_config(),
            services,
            Arc::new(AtomicBool::new(false)),
        ))
    }

    #[derive(Debug)]
    struct Greeter(&'static str);

    #[tokio::test]
    async fn test_current_outside_scope_fails() {
        assert!(matches!(current(), Err(SyncError::NoTenantContext)));
    }

    #[tokio::test]
    async fn test_scope_exposes_tenant_and_services() {
        let mut services = ServiceRegistry::new();
        services.register(Arc::new(Greeter("hello")));
        let ctx = test_context("acme", services);

        let (name, greeting) = scope(ctx, async {
            let ctx = current().unwrap();
            let greeter = service::<Greeter>().unwrap();
            (ctx.name.clone(), greeter.0)
        })
        .await;

        assert_eq!(name, "acme");
        assert_eq!(greeting, "hello");
        assert!(current().is_err());
    }

    #[tokio::test]
    async fn test_missing_service_names_tenant() {
        let ctx = test_context("acme", ServiceRegistry::new());
        let err = ctx.service::<Greeter>().unwrap_err();
        match err {
            SyncError::ServiceNotFound { tenant, service } => {
                assert_eq!(tenant, "acme");
                assert_eq!(service, "Greeter");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nested_scopes_are_isolated() {
        let outer = test_context("outer", ServiceRegistry::new());
        let inner = test_context("inner", ServiceRegistry::new());

        scope(outer, async move {
            let seen = scope(inner, async { current().unwrap().name.clone() }).await;
            assert_eq!(seen, "inner");
            assert_eq!(current().unwrap().name, "outer");
        })
        .await;
    }

    #[test]
    fn test_scan_guard_resets_flag() {
        let ctx = test_context("acme", ServiceRegistry::new());
        let guard = ctx.try_begin_scan().unwrap();
        assert!(ctx.is_scanning());
        assert!(ctx.try_begin_scan().is_none());
        drop(guard);
        assert!(!ctx.is_scanning());
        assert!(ctx.try_begin_scan().is_some());
    }

    #[test]
    fn test_registry_lookup_and_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(TenantContext::new(
            "acme",
            test_config(),
            ServiceRegistry::new(),
            Arc::clone(&shutdown),
        ));
        let registry = TenantRegistry::new(vec![ctx.clone()], shutdown);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("acme").is_ok());
        assert!(matches!(registry.get("other"), Err(SyncError::UnknownTenant(_))));

        registry.request_shutdown();
        assert!(ctx.is_shutting_down());
    }
}
