use crate::catalog::{CatalogCache, Spec, Template};
use crate::cluster::{
    with_timeout, ClusterController, ClusterError, CreateOutcome, CreateSpaceRequest,
    StartOutcome, StartSpaceRequest,
};
use crate::environment::{ProviderCredentials, RepositoryRef};
use crate::error::{OrchestratorError, Result};
use crate::operation::{Operation, OperationJournal, OperationType};
use crate::store::{NewWorkspace, WorkspaceStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_POD_PORT: u32 = 9999;
pub const DEFAULT_MAX_SPACE_COUNT: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workspace {
    pub id: i64,
    pub sid: String,
    pub user_id: i64,
    pub template_id: i64,
    pub spec_id: i64,
    pub name: String,
    pub git_repository: Option<String>,

    /// Serialized provider environment. Holds credentials, so it never leaves the service.
    #[serde(skip_serializing, default)]
    pub environment: Option<String>,

    pub status: SpaceStatus,
    pub running_status: RunningStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<SpecSummary>,

    pub create_time: DateTime<Utc>,
    pub delete_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    /// Accumulated running time in seconds.
    pub total_time: i64,
}

/// Lifecycle state as persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SpaceStatus {
    /// Reserved locally; nothing exists in the cluster yet.
    Uncreated,
    Available,
    Deleted,
}

/// Derived from the cluster on every read; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunningStatus {
    #[default]
    NotRunning,
    Running,
}

/// Spec details embedded in a workspace for display, without the catalog id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SpecSummary {
    pub name: String,
    pub description: String,
    pub cpu_spec: String,
    pub mem_spec: String,
    pub storage_spec: String,
}

impl From<&Spec> for SpecSummary {
    fn from(spec: &Spec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            cpu_spec: spec.cpu_spec.clone(),
            mem_spec: spec.mem_spec.clone(),
            storage_spec: spec.storage_spec.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub template_id: i64,
    pub spec_id: i64,
    #[serde(default)]
    pub git_repository: Option<String>,
    #[serde(flatten)]
    pub credentials: ProviderCredentials,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_space_count: i64,
    /// Enforce at most one running workspace per user via post-action reconciliation.
    pub enforce_single_running: bool,
    pub pod_port: u32,
    pub volume_mount_path: String,
    pub create_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub delete_timeout: Duration,
    pub running_query_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_space_count: DEFAULT_MAX_SPACE_COUNT,
            enforce_single_running: false,
            pod_port: DEFAULT_POD_PORT,
            volume_mount_path: "/root/".to_string(),
            // Image pulls can be slow
            create_timeout: Duration::from_secs(90),
            start_timeout: Duration::from_secs(90),
            stop_timeout: Duration::from_secs(30),
            delete_timeout: Duration::from_secs(30),
            running_query_timeout: Duration::from_secs(30),
        }
    }
}

/// Coordinates the store, the catalog and the cluster controller.
///
/// Holds no lock across requests; cross-request consistency comes from the
/// store's conditional writes and the controller's own concurrency control.
#[derive(Clone)]
pub struct WorkspaceOrchestrator {
    store: WorkspaceStore,
    journal: OperationJournal,
    catalog: Arc<CatalogCache>,
    cluster: Arc<dyn ClusterController>,
    config: Arc<OrchestratorConfig>,
}

impl WorkspaceOrchestrator {
    pub fn new(
        pool: SqlitePool,
        catalog: Arc<CatalogCache>,
        cluster: Arc<dyn ClusterController>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store: WorkspaceStore::new(pool.clone()),
            journal: OperationJournal::new(pool),
            catalog,
            cluster,
            config: Arc::new(config),
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Reserve a workspace in the store. Does not contact the cluster.
    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_workspace(
        &self,
        req: &CreateWorkspaceRequest,
        user_id: i64,
    ) -> Result<Workspace> {
        let max = self.config.max_space_count;

        let count = self.store.count_by_user(user_id).await.map_err(|e| {
            warn!("Failed to count workspaces: {}", e);
            OrchestratorError::SpaceCreate
        })?;
        if count >= max {
            return Err(OrchestratorError::ReachMaxCount(max));
        }

        let existing = self
            .store
            .find_by_user_and_name(user_id, &req.name)
            .await
            .map_err(|e| {
                warn!("Failed to check workspace name: {}", e);
                OrchestratorError::SpaceCreate
            })?;
        if existing.is_some() {
            return Err(OrchestratorError::NameDuplicate(req.name.clone()));
        }

        let template = self
            .lookup_template(req.template_id, OrchestratorError::SpaceCreate)
            .await?
            .ok_or_else(|| {
                OrchestratorError::ParamInvalid(format!("unknown template {}", req.template_id))
            })?;
        let spec = self
            .lookup_spec(req.spec_id, OrchestratorError::SpaceCreate)
            .await?
            .ok_or_else(|| {
                OrchestratorError::ParamInvalid(format!("unknown spec {}", req.spec_id))
            })?;

        let environment = if template.inject_env {
            Some(req.credentials.to_environment()?)
        } else {
            None
        };

        let new = NewWorkspace {
            sid: generate_sid(),
            user_id,
            template_id: template.id,
            spec_id: spec.id,
            name: req.name.clone(),
            git_repository: req.git_repository.clone().filter(|url| !url.is_empty()),
            environment,
            create_time: Utc::now(),
        };

        let id = match self.store.insert(&new, max).await {
            Ok(Some(id)) => id,
            // Lost a race with a concurrent create for the last slot
            Ok(None) => return Err(OrchestratorError::ReachMaxCount(max)),
            Err(e @ OrchestratorError::NameDuplicate(_)) => return Err(e),
            Err(e) => {
                error!(sid = %new.sid, "Failed to insert workspace: {}", e);
                return Err(OrchestratorError::SpaceCreate);
            }
        };

        info!(id, sid = %new.sid, user_id, "Workspace reserved");

        Ok(Workspace {
            id,
            sid: new.sid,
            user_id,
            template_id: new.template_id,
            spec_id: new.spec_id,
            name: new.name,
            git_repository: new.git_repository,
            environment: new.environment,
            status: SpaceStatus::Uncreated,
            running_status: RunningStatus::NotRunning,
            template_description: Some(template.description),
            avatar: Some(template.avatar),
            spec: Some(SpecSummary::from(&spec)),
            create_time: DateTime::from_timestamp(new.create_time.timestamp(), 0)
                .unwrap_or(new.create_time),
            delete_time: None,
            start_time: None,
            stop_time: None,
            total_time: 0,
        })
    }

    /// Reserve a workspace and immediately materialize it in the cluster.
    ///
    /// If the cluster call fails the reservation stays `uncreated`; a later
    /// start retries the full create path.
    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_and_start_workspace(
        &self,
        req: &CreateWorkspaceRequest,
        user_id: i64,
        uid: &str,
    ) -> Result<Workspace> {
        let workspace = self.create_workspace(req, user_id).await?;
        self.provision(workspace, uid).await
    }

    #[instrument(skip(self))]
    pub async fn start_workspace(&self, id: i64, user_id: i64, uid: &str) -> Result<Workspace> {
        let workspace = self.owned(id, user_id).await?;

        match workspace.status {
            SpaceStatus::Deleted => Err(OrchestratorError::WorkSpaceNotExist),
            // Reserved but never provisioned (e.g. an earlier create failed remotely)
            SpaceStatus::Uncreated => self.provision(workspace, uid).await,
            SpaceStatus::Available => self.resume(workspace, uid).await,
        }
    }

    /// Stop a running workspace.
    ///
    /// Returns `WorkSpaceIsNotRunning` when the cluster does not report it as
    /// running; callers treat that as a successful no-op.
    #[instrument(skip(self))]
    pub async fn stop_workspace(&self, id: i64, user_id: i64, uid: &str) -> Result<()> {
        let workspace = self.owned(id, user_id).await?;

        let running = self.running_sids(uid).await.map_err(|e| {
            error!(sid = %workspace.sid, "Failed to query running workspaces: {}", e);
            e
        })?;
        if !running.iter().any(|sid| sid == &workspace.sid) {
            debug!(sid = %workspace.sid, "Workspace is not running");
            return Err(OrchestratorError::WorkSpaceIsNotRunning);
        }

        self.stop_remote(&workspace, uid).await?;
        info!(sid = %workspace.sid, "Workspace stopped");
        Ok(())
    }

    /// Tear down the cluster resource, then remove the store row.
    ///
    /// Not atomic across the two systems. A failed remote teardown leaves the
    /// row in place so the live resource is not lost track of; a failed local
    /// delete after a successful teardown is logged as an orphaned record.
    #[instrument(skip(self))]
    pub async fn delete_workspace(&self, id: i64, user_id: i64, uid: &str) -> Result<()> {
        let workspace = self.owned(id, user_id).await?;

        if self.config.enforce_single_running {
            let running = self.running_sids(uid).await?;
            if running.iter().any(|sid| sid == &workspace.sid) {
                return Err(OrchestratorError::WorkSpaceIsRunning);
            }
        }

        if self.has_cluster_resource(&workspace).await? {
            let op = self.journal.begin(&workspace, OperationType::Delete).await;
            let result = with_timeout(
                "delete_space",
                self.config.delete_timeout,
                self.cluster.delete_space(&workspace.sid, uid),
            )
            .await;

            if let Err(e) = result {
                warn!(sid = %workspace.sid, "Cluster delete failed, keeping store row: {}", e);
                self.journal.fail(op, &e.to_string()).await;
                return Err(match e {
                    ClusterError::Remote(_) => OrchestratorError::SpaceDelete,
                    other => OrchestratorError::Cluster(other),
                });
            }
            self.journal.succeed(op).await;
        } else {
            debug!(
                sid = %workspace.sid,
                "No cluster resource was ever requested, skipping teardown"
            );
        }

        match self.store.delete_by_id(workspace.id, user_id).await {
            Ok(0) => Err(OrchestratorError::WorkSpaceNotExist),
            Ok(_) => {
                info!(sid = %workspace.sid, "Workspace deleted");
                Ok(())
            }
            Err(e) => {
                error!(
                    sid = %workspace.sid,
                    id = workspace.id,
                    "Cluster resource removed but store delete failed, record is orphaned: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Live workspaces with catalog display fields and running status.
    ///
    /// Running status is best effort: if the cluster cannot be queried every
    /// entry is reported as not running instead of failing the call.
    #[instrument(skip(self))]
    pub async fn list_workspaces(&self, user_id: i64, uid: &str) -> Result<Vec<Workspace>> {
        let mut workspaces = self.store.list_by_user(user_id).await?;

        let catalog = self.catalog.snapshot().await?;
        for workspace in &mut workspaces {
            if let Some(template) = catalog.template(workspace.template_id) {
                workspace.template_description = Some(template.description.clone());
                workspace.avatar = Some(template.avatar.clone());
            }
            workspace.spec = catalog.spec(workspace.spec_id).map(SpecSummary::from);
        }

        match self.running_sids(uid).await {
            Ok(running) => {
                for workspace in &mut workspaces {
                    if running.contains(&workspace.sid) {
                        workspace.running_status = RunningStatus::Running;
                    }
                }
            }
            Err(e) => warn!(uid, "Failed to query running workspaces: {}", e),
        }

        Ok(workspaces)
    }

    #[instrument(skip(self))]
    pub async fn modify_name(&self, name: &str, id: i64, user_id: i64) -> Result<()> {
        if name.trim().is_empty() {
            return Err(OrchestratorError::ParamInvalid("name must not be empty".to_string()));
        }

        if let Some(existing) = self.store.find_by_user_and_name(user_id, name).await? {
            if existing.id == id {
                return Ok(());
            }
            return Err(OrchestratorError::NameDuplicate(name.to_string()));
        }

        match self.store.update_name(name, id, user_id).await? {
            0 => Err(OrchestratorError::WorkSpaceNotExist),
            _ => Ok(()),
        }
    }

    /// Journal entries for a workspace owned by `user_id`.
    pub async fn operations(&self, id: i64, user_id: i64) -> Result<Vec<Operation>> {
        let workspace = self.owned(id, user_id).await?;
        self.journal.list_for_workspace(workspace.id).await
    }

    async fn owned(&self, id: i64, user_id: i64) -> Result<Workspace> {
        self.store
            .find_by_id(id, user_id)
            .await?
            .ok_or(OrchestratorError::WorkSpaceNotExist)
    }

    async fn lookup_template(
        &self,
        id: i64,
        on_error: OrchestratorError,
    ) -> Result<Option<Template>> {
        self.catalog.get_template(id).await.map_err(|e| {
            error!(template_id = id, "Failed to load catalog: {}", e);
            on_error
        })
    }

    async fn lookup_spec(&self, id: i64, on_error: OrchestratorError) -> Result<Option<Spec>> {
        self.catalog.get_spec(id).await.map_err(|e| {
            error!(spec_id = id, "Failed to load catalog: {}", e);
            on_error
        })
    }

    /// Template and spec for a stored workspace. Missing entries are a start failure
    /// since the ids were valid when the workspace was created.
    async fn resolve(&self, workspace: &Workspace) -> Result<(Template, Spec)> {
        let template = self
            .lookup_template(workspace.template_id, OrchestratorError::SpaceStart)
            .await?
            .ok_or_else(|| {
                error!(
                    sid = %workspace.sid,
                    template_id = workspace.template_id,
                    "Template missing from catalog"
                );
                OrchestratorError::SpaceStart
            })?;
        let spec = self
            .lookup_spec(workspace.spec_id, OrchestratorError::SpaceStart)
            .await?
            .ok_or_else(|| {
                error!(
                    sid = %workspace.sid,
                    spec_id = workspace.spec_id,
                    "Spec missing from catalog"
                );
                OrchestratorError::SpaceStart
            })?;
        Ok((template, spec))
    }

    /// Cluster-creation path: create and start the resource, then promote the row.
    async fn provision(&self, mut workspace: Workspace, uid: &str) -> Result<Workspace> {
        let (template, spec) = self.resolve(&workspace).await?;

        let repository = RepositoryRef::new(
            template.inject_env,
            workspace.environment.as_deref(),
            workspace.git_repository.as_deref(),
        );
        let request = CreateSpaceRequest {
            sid: workspace.sid.clone(),
            uid: uid.to_string(),
            image: template.image.clone(),
            port: self.config.pod_port,
            git_repository: repository.encode(),
            volume_mount_path: self.config.volume_mount_path.clone(),
            resource_limits: spec.resource_limits(),
        };

        // Delete decides whether remote teardown is needed from this entry.
        let Some(op) = self.journal.begin(&workspace, OperationType::Create).await else {
            error!(sid = %workspace.sid, "Cannot journal create command, not issuing it");
            return Err(OrchestratorError::SpaceCreate);
        };
        let op = Some(op);
        let outcome = with_timeout(
            "create_space",
            self.config.create_timeout,
            self.cluster.create_space(request),
        )
        .await;

        match outcome {
            Ok(CreateOutcome::Created) => self.journal.succeed(op).await,
            Ok(CreateOutcome::AlreadyExists) => {
                warn!(sid = %workspace.sid, "Cluster reports workspace already exists");
                self.journal.fail(op, "already exists").await;
                return Err(OrchestratorError::SpaceAlreadyExist(workspace.sid));
            }
            Ok(CreateOutcome::Failed(message)) => {
                error!(sid = %workspace.sid, "Cluster create failed: {}", message);
                self.journal.fail(op, &message).await;
                return Err(OrchestratorError::SpaceCreate);
            }
            Err(e) => {
                error!(sid = %workspace.sid, "Cluster create call failed: {}", e);
                self.journal.fail(op, &e.to_string()).await;
                return Err(e.into());
            }
        }

        if workspace.status == SpaceStatus::Uncreated {
            match self
                .store
                .transition_status(workspace.id, SpaceStatus::Uncreated, SpaceStatus::Available)
                .await
            {
                Ok(_) => workspace.status = SpaceStatus::Available,
                Err(e) => error!(
                    sid = %workspace.sid,
                    "Workspace created in cluster but status update failed: {}",
                    e
                ),
            }
        }

        self.mark_started(&mut workspace).await;
        self.enforce_exclusive(&mut workspace, uid).await?;
        info!(sid = %workspace.sid, "Workspace created and started");
        Ok(workspace)
    }

    /// Start path for a workspace that already exists in the cluster.
    async fn resume(&self, mut workspace: Workspace, uid: &str) -> Result<Workspace> {
        let (_, spec) = self.resolve(&workspace).await?;

        let request = StartSpaceRequest {
            sid: workspace.sid.clone(),
            uid: uid.to_string(),
            resource_limits: spec.resource_limits(),
        };

        let op = self.journal.begin(&workspace, OperationType::Start).await;
        let outcome = with_timeout(
            "start_space",
            self.config.start_timeout,
            self.cluster.start_space(request),
        )
        .await;

        match outcome {
            Ok(StartOutcome::Started) => self.journal.succeed(op).await,
            Ok(StartOutcome::NotFound) => {
                warn!(sid = %workspace.sid, "Cluster has no resource for workspace");
                self.journal.fail(op, "not found").await;
                return Err(OrchestratorError::SpaceNotFound(workspace.sid));
            }
            Ok(StartOutcome::Failed(message)) => {
                error!(sid = %workspace.sid, "Cluster start failed: {}", message);
                self.journal.fail(op, &message).await;
                return Err(OrchestratorError::SpaceStart);
            }
            Err(e) => {
                error!(sid = %workspace.sid, "Cluster start call failed: {}", e);
                self.journal.fail(op, &e.to_string()).await;
                return Err(e.into());
            }
        }

        self.mark_started(&mut workspace).await;
        self.enforce_exclusive(&mut workspace, uid).await?;
        info!(sid = %workspace.sid, "Workspace started");
        Ok(workspace)
    }

    async fn mark_started(&self, workspace: &mut Workspace) {
        let now = Utc::now();
        workspace.running_status = RunningStatus::Running;
        workspace.start_time = DateTime::from_timestamp(now.timestamp(), 0);
        if let Err(e) = self.store.record_started(workspace.id, now).await {
            warn!(sid = %workspace.sid, "Failed to record start time: {}", e);
        }
    }

    async fn stop_remote(&self, workspace: &Workspace, uid: &str) -> Result<()> {
        let op = self.journal.begin(workspace, OperationType::Stop).await;
        let result = with_timeout(
            "stop_space",
            self.config.stop_timeout,
            self.cluster.stop_space(&workspace.sid, uid),
        )
        .await;

        if let Err(e) = result {
            error!(sid = %workspace.sid, "Cluster stop failed: {}", e);
            self.journal.fail(op, &e.to_string()).await;
            return Err(match e {
                ClusterError::Remote(_) => OrchestratorError::SpaceStop,
                other => OrchestratorError::Cluster(other),
            });
        }
        self.journal.succeed(op).await;

        if let Err(e) = self.store.record_stopped(workspace.id, Utc::now()).await {
            warn!(sid = %workspace.sid, "Failed to record stop time: {}", e);
        }
        Ok(())
    }

    /// Post-action reconciliation for the one-running-workspace rule.
    ///
    /// Runs after the cluster confirmed this workspace is up, so the running
    /// set already includes it and no concurrently started workspace can be
    /// missed. If any other workspace of the user is running, the one just
    /// started is stopped again. Two concurrent starts may both back off.
    ///
    /// If the controller cannot report the running set, the start stands and
    /// the failure is logged at error level: the rule holds only while the
    /// controller answers.
    async fn enforce_exclusive(&self, workspace: &mut Workspace, uid: &str) -> Result<()> {
        if !self.config.enforce_single_running {
            return Ok(());
        }

        let running = match self.running_sids(uid).await {
            Ok(running) => running,
            Err(e) => {
                error!(sid = %workspace.sid, "Cannot verify single running workspace: {}", e);
                return Ok(());
            }
        };

        if running.iter().all(|sid| sid == &workspace.sid) {
            return Ok(());
        }

        warn!(sid = %workspace.sid, "Another workspace is running, stopping this one again");
        if let Err(e) = self.stop_remote(workspace, uid).await {
            error!(sid = %workspace.sid, "Failed to roll back start: {}", e);
        } else {
            workspace.running_status = RunningStatus::NotRunning;
        }
        Err(OrchestratorError::OtherSpaceRunning)
    }

    async fn running_sids(&self, uid: &str) -> Result<Vec<String>> {
        let running = with_timeout(
            "running_workspaces",
            self.config.running_query_timeout,
            self.cluster.running_workspaces(uid),
        )
        .await?;
        Ok(running)
    }

    /// A cluster resource may exist unless the workspace was never provisioned
    /// and no create command was ever issued for it.
    async fn has_cluster_resource(&self, workspace: &Workspace) -> Result<bool> {
        if workspace.status != SpaceStatus::Uncreated {
            return Ok(true);
        }
        self.journal.has_create_attempt(&workspace.sid).await
    }
}

/// Globally unique correlation id, the only identifier the cluster knows.
fn generate_sid() -> String {
    Uuid::new_v4().simple().to_string()
}
