//! Fixtures shared by this crate's tests and by ide-api's tests.

use crate::catalog::{CatalogCache, SqliteCatalog};
use crate::cluster::{
    ClusterController, ClusterError, CreateOutcome, CreateSpaceRequest, StartOutcome,
    StartSpaceRequest,
};
use crate::workspace::{OrchestratorConfig, WorkspaceOrchestrator};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Helper to create an in-memory test database with migrations applied
pub async fn create_test_db() -> SqlitePool {
    // One connection: every pooled connection to `:memory:` would otherwise be its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Insert a user row with the given VIP status and expiry (unix seconds).
pub async fn insert_user(
    pool: &SqlitePool,
    id: i64,
    uid: &str,
    vip_status: i64,
    vip_expire_time: i64,
) {
    sqlx::query(
        "INSERT INTO users (id, uid, username, vip_status, vip_expire_time) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(uid)
    .bind(format!("user-{id}"))
    .bind(vip_status)
    .bind(vip_expire_time)
    .execute(pool)
    .await
    .expect("Failed to insert user");
}

/// Orchestrator over `pool` backed by the seeded catalog and the given controller.
pub fn orchestrator_with(
    pool: SqlitePool,
    cluster: Arc<MockClusterController>,
    config: OrchestratorConfig,
) -> WorkspaceOrchestrator {
    let catalog = Arc::new(CatalogCache::new(Arc::new(SqliteCatalog::new(pool.clone()))));
    WorkspaceOrchestrator::new(pool, catalog, cluster, config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockMethod {
    Create,
    Start,
    Stop,
    Delete,
    Running,
}

/// Scripted answer for one controller method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    Succeed,
    /// Create only.
    AlreadyExists,
    /// Start only.
    NotFound,
    RemoteError(String),
    TransportError(String),
    /// Never answer, so the caller's timeout fires.
    Stall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Create(CreateSpaceRequest),
    Start(StartSpaceRequest),
    Stop { sid: String, uid: String },
    Delete { sid: String, uid: String },
    Running { uid: String },
}

#[derive(Default)]
struct MockState {
    provisioned: BTreeSet<String>,
    running: BTreeMap<String, String>,
    behaviors: HashMap<MockMethod, MockBehavior>,
    calls: Vec<ClusterCall>,
}

/// In-memory cluster controller that tracks provisioned and running workspaces.
#[derive(Default)]
pub struct MockClusterController {
    state: Mutex<MockState>,
}

impl MockClusterController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, method: MockMethod, behavior: MockBehavior) {
        self.lock().behaviors.insert(method, behavior);
    }

    /// Pretend `sid` was started for `uid` outside this orchestrator.
    pub fn mark_running(&self, sid: &str, uid: &str) {
        let mut state = self.lock();
        state.provisioned.insert(sid.to_string());
        state.running.insert(sid.to_string(), uid.to_string());
    }

    pub fn is_running(&self, sid: &str) -> bool {
        self.lock().running.contains_key(sid)
    }

    pub fn is_provisioned(&self, sid: &str) -> bool {
        self.lock().provisioned.contains(sid)
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, method: MockMethod) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    (method, call),
                    (MockMethod::Create, ClusterCall::Create(_))
                        | (MockMethod::Start, ClusterCall::Start(_))
                        | (MockMethod::Stop, ClusterCall::Stop { .. })
                        | (MockMethod::Delete, ClusterCall::Delete { .. })
                        | (MockMethod::Running, ClusterCall::Running { .. })
                )
            })
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and return the scripted behavior for it.
    fn enter(&self, method: MockMethod, call: ClusterCall) -> MockBehavior {
        let mut state = self.lock();
        state.calls.push(call);
        state
            .behaviors
            .get(&method)
            .cloned()
            .unwrap_or(MockBehavior::Succeed)
    }
}

async fn failure<T>(behavior: MockBehavior) -> Result<T, ClusterError> {
    match behavior {
        MockBehavior::RemoteError(msg) => Err(ClusterError::Remote(msg)),
        MockBehavior::TransportError(msg) => Err(ClusterError::Transport(msg)),
        MockBehavior::Stall => std::future::pending().await,
        other => panic!("{other:?} is not a failure behavior"),
    }
}

#[async_trait]
impl ClusterController for MockClusterController {
    async fn create_space(&self, req: CreateSpaceRequest) -> Result<CreateOutcome, ClusterError> {
        let sid = req.sid.clone();
        let uid = req.uid.clone();
        match self.enter(MockMethod::Create, ClusterCall::Create(req)) {
            MockBehavior::Succeed => {
                let mut state = self.lock();
                if !state.provisioned.insert(sid.clone()) {
                    return Ok(CreateOutcome::AlreadyExists);
                }
                state.running.insert(sid, uid);
                Ok(CreateOutcome::Created)
            }
            MockBehavior::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
            MockBehavior::RemoteError(msg) => Ok(CreateOutcome::Failed(msg)),
            other => failure(other).await,
        }
    }

    async fn start_space(&self, req: StartSpaceRequest) -> Result<StartOutcome, ClusterError> {
        let sid = req.sid.clone();
        let uid = req.uid.clone();
        match self.enter(MockMethod::Start, ClusterCall::Start(req)) {
            MockBehavior::Succeed => {
                let mut state = self.lock();
                if !state.provisioned.contains(&sid) {
                    return Ok(StartOutcome::NotFound);
                }
                state.running.insert(sid, uid);
                Ok(StartOutcome::Started)
            }
            MockBehavior::NotFound => Ok(StartOutcome::NotFound),
            MockBehavior::RemoteError(msg) => Ok(StartOutcome::Failed(msg)),
            other => failure(other).await,
        }
    }

    async fn stop_space(&self, sid: &str, uid: &str) -> Result<(), ClusterError> {
        let call = ClusterCall::Stop {
            sid: sid.to_string(),
            uid: uid.to_string(),
        };
        match self.enter(MockMethod::Stop, call) {
            MockBehavior::Succeed => {
                self.lock().running.remove(sid);
                Ok(())
            }
            other => failure(other).await,
        }
    }

    async fn delete_space(&self, sid: &str, uid: &str) -> Result<(), ClusterError> {
        let call = ClusterCall::Delete {
            sid: sid.to_string(),
            uid: uid.to_string(),
        };
        match self.enter(MockMethod::Delete, call) {
            MockBehavior::Succeed => {
                let mut state = self.lock();
                state.running.remove(sid);
                state.provisioned.remove(sid);
                Ok(())
            }
            other => failure(other).await,
        }
    }

    async fn running_workspaces(&self, uid: &str) -> Result<Vec<String>, ClusterError> {
        let call = ClusterCall::Running {
            uid: uid.to_string(),
        };
        match self.enter(MockMethod::Running, call) {
            MockBehavior::Succeed => Ok(self
                .lock()
                .running
                .iter()
                .filter(|(_, owner)| owner.as_str() == uid)
                .map(|(sid, _)| sid.clone())
                .collect()),
            other => failure(other).await,
        }
    }
}
