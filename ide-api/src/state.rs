use crate::config::{Config, OAuthConfig};
use crate::oauth::OAuthStateStore;
use ide_orchestrator::{
    CatalogCache, ClusterController, EntitlementPolicy, PaymentService, SqliteCatalog,
    SubscriptionService, WorkspaceOrchestrator,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Process-lifetime components shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: WorkspaceOrchestrator,
    pub subscriptions: SubscriptionService,
    pub payments: PaymentService,
    pub policy: EntitlementPolicy,
    pub oauth_states: Arc<OAuthStateStore>,
    pub oauth: Arc<OAuthConfig>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pool: SqlitePool, cluster: Arc<dyn ClusterController>, config: &Config) -> Self {
        let catalog = Arc::new(CatalogCache::new(Arc::new(SqliteCatalog::new(pool.clone()))));

        Self {
            orchestrator: WorkspaceOrchestrator::new(
                pool.clone(),
                catalog,
                cluster,
                config.orchestrator_config(),
            ),
            subscriptions: SubscriptionService::new(pool.clone()),
            payments: PaymentService::new(pool),
            policy: EntitlementPolicy {
                restrict_premium_templates: config.restrict_premium_templates,
                ..EntitlementPolicy::default()
            },
            oauth_states: Arc::new(OAuthStateStore::default()),
            oauth: Arc::new(config.oauth.clone()),
            admin_token: config.admin_token.as_deref().map(Arc::from),
        }
    }
}
