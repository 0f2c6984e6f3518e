//! Integration tests for ide-orchestrator
//!
//! Drives the orchestrator against an in-memory database and the mock cluster
//! controller: quota and name rules, the create/start reconciliation path,
//! degraded listing, partial failures, and the operation journal.

use ide_orchestrator::cluster::ClusterError;
use ide_orchestrator::environment::RepositoryRef;
use ide_orchestrator::test_utils::{
    create_test_db, orchestrator_with, ClusterCall, MockBehavior, MockClusterController,
    MockMethod,
};
use ide_orchestrator::{
    CreateWorkspaceRequest, OperationStatus, OperationType, OrchestratorConfig,
    OrchestratorError, ProviderCredentials, RunningStatus, SpaceStatus, WorkspaceOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;

const USER: i64 = 1;
const UID: &str = "uid-alice";

fn request(name: &str) -> CreateWorkspaceRequest {
    CreateWorkspaceRequest {
        name: name.to_string(),
        template_id: 2,
        spec_id: 1,
        git_repository: Some("https://github.com/example/app.git".to_string()),
        credentials: ProviderCredentials::default(),
    }
}

async fn setup_with(
    config: OrchestratorConfig,
) -> (WorkspaceOrchestrator, Arc<MockClusterController>) {
    let pool = create_test_db().await;
    let cluster = Arc::new(MockClusterController::new());
    let orchestrator = orchestrator_with(pool, cluster.clone(), config);
    (orchestrator, cluster)
}

async fn setup() -> (WorkspaceOrchestrator, Arc<MockClusterController>) {
    setup_with(OrchestratorConfig::default()).await
}

fn short_timeouts() -> OrchestratorConfig {
    OrchestratorConfig {
        create_timeout: Duration::from_millis(50),
        start_timeout: Duration::from_millis(50),
        stop_timeout: Duration::from_millis(50),
        delete_timeout: Duration::from_millis(50),
        running_query_timeout: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    }
}

#[tokio::test]
async fn test_create_workspace_reserves_without_cluster() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_workspace(&request("app"), USER)
        .await
        .expect("Failed to create workspace");

    assert!(workspace.id > 0);
    assert_eq!(workspace.name, "app");
    assert_eq!(workspace.status, SpaceStatus::Uncreated);
    assert_eq!(workspace.running_status, RunningStatus::NotRunning);
    assert_eq!(workspace.sid.len(), 32);
    assert!(workspace.environment.is_none());
    assert_eq!(workspace.spec.as_ref().map(|s| s.cpu_spec.as_str()), Some("2"));
    assert!(cluster.calls().is_empty());

    let stored = orchestrator
        .store()
        .find_by_id(workspace.id, USER)
        .await
        .unwrap()
        .expect("workspace should be persisted");
    assert_eq!(stored.sid, workspace.sid);
    assert_eq!(stored.status, SpaceStatus::Uncreated);
}

#[tokio::test]
async fn test_create_rejects_beyond_max_count() {
    let (orchestrator, _cluster) = setup().await;

    for i in 0..10 {
        orchestrator
            .create_workspace(&request(&format!("ws-{i}")), USER)
            .await
            .unwrap();
    }

    for attempt in 0..3 {
        let err = orchestrator
            .create_workspace(&request(&format!("new-{attempt}")), USER)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ReachMaxCount(10)), "got {err:?}");
    }

    assert_eq!(orchestrator.store().count_by_user(USER).await.unwrap(), 10);
    // Other users have their own quota
    orchestrator.create_workspace(&request("ws-0"), 2).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_creates_respect_max_count() {
    let (orchestrator, _cluster) = setup().await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .create_workspace(&request(&format!("ws-{i}")), USER)
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(OrchestratorError::ReachMaxCount(_)) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    assert_eq!(created, 10);
    assert_eq!(orchestrator.store().count_by_user(USER).await.unwrap(), 10);
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let (orchestrator, _cluster) = setup().await;

    orchestrator.create_workspace(&request("foo"), USER).await.unwrap();
    let err = orchestrator
        .create_workspace(&request("foo"), USER)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::NameDuplicate(ref name) if name == "foo"));
}

#[tokio::test]
async fn test_concurrent_duplicate_names_yield_single_workspace() {
    let (orchestrator, _cluster) = setup().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.create_workspace(&request("same"), USER).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(OrchestratorError::NameDuplicate(_)) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(orchestrator.list_workspaces(USER, UID).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_catalog_ids_are_param_invalid() {
    let (orchestrator, _cluster) = setup().await;

    let mut bad_template = request("a");
    bad_template.template_id = 999;
    let err = orchestrator.create_workspace(&bad_template, USER).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ParamInvalid(_)));

    let mut bad_spec = request("b");
    bad_spec.spec_id = 999;
    let err = orchestrator.create_workspace(&bad_spec, USER).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ParamInvalid(_)));

    assert_eq!(orchestrator.store().count_by_user(USER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_and_start_provisions_workspace() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();

    assert_eq!(workspace.status, SpaceStatus::Available);
    assert_eq!(workspace.running_status, RunningStatus::Running);
    assert!(cluster.is_running(&workspace.sid));

    let calls = cluster.calls();
    let ClusterCall::Create(create) = &calls[0] else {
        panic!("expected a create call, got {calls:?}");
    };
    assert_eq!(create.sid, workspace.sid);
    assert_eq!(create.uid, UID);
    assert_eq!(create.image, "mangohow/code-server-go:v1.0");
    assert_eq!(create.port, 9999);
    assert_eq!(create.volume_mount_path, "/root/");
    assert_eq!(create.git_repository, "https://github.com/example/app.git");
    assert_eq!(create.resource_limits.cpu, "2");
    assert_eq!(create.resource_limits.memory, "4Gi");
    assert_eq!(create.resource_limits.storage, "16Gi");

    let stored = orchestrator
        .store()
        .find_by_id(workspace.id, USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SpaceStatus::Available);
    assert!(stored.start_time.is_some());
}

#[tokio::test]
async fn test_inject_env_template_embeds_environment() {
    let (orchestrator, cluster) = setup().await;

    let mut req = request("assistant");
    req.template_id = 7;
    req.credentials.anthropic_auth_token = Some("sk-test".to_string());

    let workspace = orchestrator
        .create_and_start_workspace(&req, USER, UID)
        .await
        .unwrap();
    assert!(workspace.environment.is_some());

    let calls = cluster.calls();
    let ClusterCall::Create(create) = &calls[0] else {
        panic!("expected a create call, got {calls:?}");
    };
    assert!(create.git_repository.starts_with("ENV:"));
    assert!(create
        .git_repository
        .ends_with("|GIT:https://github.com/example/app.git"));

    let decoded = RepositoryRef::decode(&create.git_repository);
    assert_eq!(decoded.git_repository, "https://github.com/example/app.git");
    let env: serde_json::Value =
        serde_json::from_str(decoded.environment.as_deref().unwrap()).unwrap();
    assert_eq!(env["ANTHROPIC_AUTH_TOKEN"], "sk-test");
    assert_eq!(env["BIG_MODEL"], "claude-3-5-sonnet-20241022");
    assert_eq!(env["SMALL_MODEL"], "claude-3-haiku-20240307");
}

#[tokio::test]
async fn test_already_exists_keeps_workspace_uncreated() {
    let (orchestrator, cluster) = setup().await;
    cluster.set_behavior(MockMethod::Create, MockBehavior::AlreadyExists);

    let err = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SpaceAlreadyExist(_)));

    let workspaces = orchestrator.list_workspaces(USER, UID).await.unwrap();
    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].status, SpaceStatus::Uncreated);
}

#[tokio::test]
async fn test_create_remote_error_is_space_create() {
    let (orchestrator, cluster) = setup().await;
    cluster.set_behavior(MockMethod::Create, MockBehavior::RemoteError("image pull failed".into()));

    let err = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SpaceCreate));
}

#[tokio::test]
async fn test_create_transport_error_propagates() {
    let (orchestrator, cluster) = setup().await;
    cluster.set_behavior(
        MockMethod::Create,
        MockBehavior::TransportError("connection refused".into()),
    );

    let err = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Cluster(ClusterError::Transport(_))
    ));
}

#[tokio::test]
async fn test_create_timeout_is_distinct_error() {
    let (orchestrator, cluster) = setup_with(short_timeouts()).await;
    cluster.set_behavior(MockMethod::Create, MockBehavior::Stall);

    let err = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Cluster(ClusterError::Timeout { operation: "create_space", .. })
    ));
    // Not retried
    assert_eq!(cluster.count(MockMethod::Create), 1);
}

#[tokio::test]
async fn test_start_uncreated_issues_create_not_start() {
    let (orchestrator, cluster) = setup().await;

    let reserved = orchestrator.create_workspace(&request("app"), USER).await.unwrap();
    let started = orchestrator
        .start_workspace(reserved.id, USER, UID)
        .await
        .unwrap();

    assert_eq!(cluster.count(MockMethod::Create), 1);
    assert_eq!(cluster.count(MockMethod::Start), 0);
    assert_eq!(started.status, SpaceStatus::Available);
    assert_eq!(started.running_status, RunningStatus::Running);
}

#[tokio::test]
async fn test_start_retries_create_after_failed_provision() {
    let (orchestrator, cluster) = setup().await;
    cluster.set_behavior(MockMethod::Create, MockBehavior::TransportError("unavailable".into()));

    let _ = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap_err();
    let id = orchestrator.list_workspaces(USER, UID).await.unwrap()[0].id;

    cluster.set_behavior(MockMethod::Create, MockBehavior::Succeed);
    let started = orchestrator.start_workspace(id, USER, UID).await.unwrap();

    assert_eq!(started.status, SpaceStatus::Available);
    assert_eq!(cluster.count(MockMethod::Create), 2);
    assert_eq!(cluster.count(MockMethod::Start), 0);
}

#[tokio::test]
async fn test_start_available_workspace() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();
    orchestrator.stop_workspace(workspace.id, USER, UID).await.unwrap();
    assert!(!cluster.is_running(&workspace.sid));

    let restarted = orchestrator
        .start_workspace(workspace.id, USER, UID)
        .await
        .unwrap();

    assert_eq!(restarted.running_status, RunningStatus::Running);
    assert_eq!(cluster.count(MockMethod::Start), 1);
    assert!(cluster.is_running(&workspace.sid));

    let calls = cluster.calls();
    let start = calls
        .iter()
        .find_map(|call| match call {
            ClusterCall::Start(req) => Some(req.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(start.resource_limits.memory, "4Gi");
}

#[tokio::test]
async fn test_start_missing_in_cluster_is_space_not_found() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();
    cluster.set_behavior(MockMethod::Start, MockBehavior::NotFound);

    let err = orchestrator
        .start_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SpaceNotFound(ref sid) if *sid == workspace.sid));

    cluster.set_behavior(MockMethod::Start, MockBehavior::RemoteError("quota".into()));
    let err = orchestrator
        .start_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SpaceStart));
}

#[tokio::test]
async fn test_other_users_workspace_is_not_found() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();

    let intruder = 2;
    for err in [
        orchestrator.start_workspace(workspace.id, intruder, "uid-bob").await.unwrap_err(),
        orchestrator.stop_workspace(workspace.id, intruder, "uid-bob").await.unwrap_err(),
        orchestrator.delete_workspace(workspace.id, intruder, "uid-bob").await.unwrap_err(),
        orchestrator.modify_name("mine", workspace.id, intruder).await.unwrap_err(),
    ] {
        assert!(matches!(err, OrchestratorError::WorkSpaceNotExist), "got {err:?}");
    }

    let missing = orchestrator.start_workspace(9999, USER, UID).await.unwrap_err();
    assert!(matches!(missing, OrchestratorError::WorkSpaceNotExist));
    assert_eq!(cluster.count(MockMethod::Delete), 0);
}

#[tokio::test]
async fn test_stop_not_running_is_benign() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator.create_workspace(&request("app"), USER).await.unwrap();
    let err = orchestrator
        .stop_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::WorkSpaceIsNotRunning));
    assert_eq!(cluster.count(MockMethod::Stop), 0);
}

#[tokio::test]
async fn test_stop_only_checks_target_workspace() {
    let (orchestrator, cluster) = setup().await;

    let idle = orchestrator.create_workspace(&request("idle"), USER).await.unwrap();
    orchestrator
        .create_and_start_workspace(&request("busy"), USER, UID)
        .await
        .unwrap();

    let err = orchestrator.stop_workspace(idle.id, USER, UID).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::WorkSpaceIsNotRunning));
    assert_eq!(cluster.count(MockMethod::Stop), 0);
}

#[tokio::test]
async fn test_stop_running_workspace_records_usage() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();
    orchestrator.stop_workspace(workspace.id, USER, UID).await.unwrap();

    assert!(!cluster.is_running(&workspace.sid));
    assert!(cluster.calls().contains(&ClusterCall::Stop {
        sid: workspace.sid.clone(),
        uid: UID.to_string(),
    }));

    let stored = orchestrator
        .store()
        .find_by_id(workspace.id, USER)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.stop_time.is_some());
    assert!(stored.start_time.is_none());
    assert!(stored.total_time >= 0);
}

#[tokio::test]
async fn test_stop_remote_error_is_space_stop() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();
    cluster.set_behavior(MockMethod::Stop, MockBehavior::RemoteError("busy".into()));

    let err = orchestrator
        .stop_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SpaceStop));
}

#[tokio::test]
async fn test_list_joins_catalog_and_running_status() {
    let (orchestrator, _cluster) = setup().await;

    let running = orchestrator
        .create_and_start_workspace(&request("running"), USER, UID)
        .await
        .unwrap();
    let mut idle_req = request("idle");
    idle_req.template_id = 3;
    idle_req.spec_id = 4;
    orchestrator.create_workspace(&idle_req, USER).await.unwrap();
    orchestrator.create_workspace(&request("someone-else"), 2).await.unwrap();

    let workspaces = orchestrator.list_workspaces(USER, UID).await.unwrap();
    assert_eq!(workspaces.len(), 2);

    assert_eq!(workspaces[0].sid, running.sid);
    assert_eq!(workspaces[0].running_status, RunningStatus::Running);
    assert_eq!(workspaces[0].avatar.as_deref(), Some("/images/go.png"));

    assert_eq!(workspaces[1].name, "idle");
    assert_eq!(workspaces[1].running_status, RunningStatus::NotRunning);
    assert_eq!(
        workspaces[1].template_description.as_deref(),
        Some("Python 3.11 with pip and venv")
    );
    let spec = workspaces[1].spec.as_ref().unwrap();
    assert_eq!(spec.name, "Test");
    assert_eq!(spec.mem_spec, "2Gi");

    let json = serde_json::to_value(&workspaces[1]).unwrap();
    assert!(json.get("environment").is_none());
    assert_eq!(json["running_status"], "not_running");
}

#[tokio::test]
async fn test_list_degrades_when_running_query_fails() {
    let (orchestrator, cluster) = setup().await;

    orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();
    cluster.set_behavior(MockMethod::Running, MockBehavior::TransportError("down".into()));

    let workspaces = orchestrator.list_workspaces(USER, UID).await.unwrap();
    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].running_status, RunningStatus::NotRunning);
}

#[tokio::test]
async fn test_list_degrades_when_running_query_times_out() {
    let (orchestrator, cluster) = setup_with(short_timeouts()).await;

    orchestrator.create_workspace(&request("a"), USER).await.unwrap();
    orchestrator.create_workspace(&request("b"), USER).await.unwrap();
    cluster.set_behavior(MockMethod::Running, MockBehavior::Stall);

    let workspaces = orchestrator.list_workspaces(USER, UID).await.unwrap();
    assert_eq!(workspaces.len(), 2);
    assert!(workspaces
        .iter()
        .all(|w| w.running_status == RunningStatus::NotRunning));
}

#[tokio::test]
async fn test_delete_removes_remote_and_local() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();
    orchestrator.delete_workspace(workspace.id, USER, UID).await.unwrap();

    assert!(!cluster.is_provisioned(&workspace.sid));
    assert!(orchestrator
        .store()
        .find_by_id(workspace.id, USER)
        .await
        .unwrap()
        .is_none());

    // The name is free again
    orchestrator.create_workspace(&request("app"), USER).await.unwrap();
}

#[tokio::test]
async fn test_delete_remote_failure_keeps_row() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();

    cluster.set_behavior(MockMethod::Delete, MockBehavior::RemoteError("pvc busy".into()));
    let err = orchestrator
        .delete_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SpaceDelete));

    cluster.set_behavior(MockMethod::Delete, MockBehavior::TransportError("reset".into()));
    let err = orchestrator
        .delete_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Cluster(ClusterError::Transport(_))));

    let stored = orchestrator
        .store()
        .find_by_id(workspace.id, USER)
        .await
        .unwrap()
        .expect("row must survive a failed remote delete");
    assert_eq!(stored.status, SpaceStatus::Available);
}

#[tokio::test]
async fn test_delete_never_provisioned_skips_cluster() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator.create_workspace(&request("app"), USER).await.unwrap();
    orchestrator.delete_workspace(workspace.id, USER, UID).await.unwrap();

    assert_eq!(cluster.count(MockMethod::Delete), 0);
    assert_eq!(orchestrator.store().count_by_user(USER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_after_failed_create_still_tears_down() {
    let (orchestrator, cluster) = setup_with(short_timeouts()).await;
    cluster.set_behavior(MockMethod::Create, MockBehavior::Stall);

    let _ = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap_err();
    let id = orchestrator.list_workspaces(USER, UID).await.unwrap()[0].id;

    orchestrator.delete_workspace(id, USER, UID).await.unwrap();
    assert_eq!(cluster.count(MockMethod::Delete), 1);
}

#[tokio::test]
async fn test_create_not_issued_without_journal_entry() {
    let (orchestrator, cluster) = setup().await;
    let workspace = orchestrator.create_workspace(&request("app"), USER).await.unwrap();

    sqlx::query(
        "CREATE TRIGGER block_operations BEFORE INSERT ON operations
         BEGIN SELECT RAISE(ABORT, 'journal unavailable'); END",
    )
    .execute(orchestrator.pool())
    .await
    .unwrap();

    let err = orchestrator
        .start_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SpaceCreate));
    assert_eq!(cluster.count(MockMethod::Create), 0);

    let stored = orchestrator
        .store()
        .find_by_id(workspace.id, USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SpaceStatus::Uncreated);

    // Nothing reached the cluster, so nothing needs tearing down
    orchestrator.delete_workspace(workspace.id, USER, UID).await.unwrap();
    assert_eq!(cluster.count(MockMethod::Delete), 0);
}

#[tokio::test]
async fn test_transition_status_is_guarded() {
    let (orchestrator, _cluster) = setup().await;
    let workspace = orchestrator.create_workspace(&request("app"), USER).await.unwrap();
    let store = orchestrator.store();

    assert!(store
        .transition_status(workspace.id, SpaceStatus::Uncreated, SpaceStatus::Available)
        .await
        .unwrap());
    // Already moved on; a second caller loses
    assert!(!store
        .transition_status(workspace.id, SpaceStatus::Uncreated, SpaceStatus::Available)
        .await
        .unwrap());

    let stored = store.find_by_id(workspace.id, USER).await.unwrap().unwrap();
    assert_eq!(stored.status, SpaceStatus::Available);
}

#[tokio::test]
async fn test_modify_name() {
    let (orchestrator, _cluster) = setup().await;

    let first = orchestrator.create_workspace(&request("first"), USER).await.unwrap();
    orchestrator.create_workspace(&request("second"), USER).await.unwrap();

    let err = orchestrator
        .modify_name("second", first.id, USER)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NameDuplicate(_)));

    // Renaming to its own name is a no-op
    orchestrator.modify_name("first", first.id, USER).await.unwrap();

    let err = orchestrator.modify_name("  ", first.id, USER).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ParamInvalid(_)));

    orchestrator.modify_name("renamed", first.id, USER).await.unwrap();
    let stored = orchestrator
        .store()
        .find_by_id(first.id, USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.name, "renamed");
}

#[tokio::test]
async fn test_single_running_enforced_after_start() {
    let config = OrchestratorConfig {
        enforce_single_running: true,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, cluster) = setup_with(config).await;

    let first = orchestrator
        .create_and_start_workspace(&request("first"), USER, UID)
        .await
        .unwrap();

    let err = orchestrator
        .create_and_start_workspace(&request("second"), USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::OtherSpaceRunning));

    let workspaces = orchestrator.list_workspaces(USER, UID).await.unwrap();
    let second = workspaces.iter().find(|w| w.name == "second").unwrap();
    // Provisioned, then stopped again by reconciliation
    assert_eq!(second.status, SpaceStatus::Available);
    assert_eq!(second.running_status, RunningStatus::NotRunning);
    assert!(cluster.is_running(&first.sid));
    assert!(!cluster.is_running(&second.sid));

    orchestrator.stop_workspace(first.id, USER, UID).await.unwrap();
    let restarted = orchestrator.start_workspace(second.id, USER, UID).await.unwrap();
    assert_eq!(restarted.running_status, RunningStatus::Running);
}

#[tokio::test]
async fn test_single_running_disabled_by_default() {
    let (orchestrator, cluster) = setup().await;

    let first = orchestrator
        .create_and_start_workspace(&request("first"), USER, UID)
        .await
        .unwrap();
    let second = orchestrator
        .create_and_start_workspace(&request("second"), USER, UID)
        .await
        .unwrap();

    assert!(cluster.is_running(&first.sid));
    assert!(cluster.is_running(&second.sid));
}

#[tokio::test]
async fn test_single_running_fails_open_when_cluster_unreachable() {
    let config = OrchestratorConfig {
        enforce_single_running: true,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, cluster) = setup_with(config).await;
    cluster.set_behavior(MockMethod::Running, MockBehavior::TransportError("down".into()));

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();

    assert_eq!(workspace.running_status, RunningStatus::Running);
    assert!(cluster.is_running(&workspace.sid));
    assert_eq!(cluster.count(MockMethod::Stop), 0);
}

#[tokio::test]
async fn test_delete_while_running_guard() {
    let config = OrchestratorConfig {
        enforce_single_running: true,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, cluster) = setup_with(config).await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();

    let err = orchestrator
        .delete_workspace(workspace.id, USER, UID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::WorkSpaceIsRunning));
    assert_eq!(cluster.count(MockMethod::Delete), 0);

    orchestrator.stop_workspace(workspace.id, USER, UID).await.unwrap();
    orchestrator.delete_workspace(workspace.id, USER, UID).await.unwrap();
}

#[tokio::test]
async fn test_operations_journal() {
    let (orchestrator, cluster) = setup().await;

    let workspace = orchestrator
        .create_and_start_workspace(&request("app"), USER, UID)
        .await
        .unwrap();
    cluster.set_behavior(MockMethod::Stop, MockBehavior::RemoteError("busy".into()));
    let _ = orchestrator.stop_workspace(workspace.id, USER, UID).await;

    let operations = orchestrator.operations(workspace.id, USER).await.unwrap();
    assert_eq!(operations.len(), 2);
    assert!(operations.iter().all(|op| op.sid == workspace.sid));

    let create = operations
        .iter()
        .find(|op| op.operation_type == OperationType::Create)
        .unwrap();
    assert_eq!(create.status, OperationStatus::Success);
    assert!(create.completed_at.is_some());

    let stop = operations
        .iter()
        .find(|op| op.operation_type == OperationType::Stop)
        .unwrap();
    assert_eq!(stop.status, OperationStatus::Failed);
    assert!(stop.error.as_deref().unwrap().contains("busy"));

    let err = orchestrator.operations(workspace.id, 2).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::WorkSpaceNotExist));
}

#[tokio::test]
async fn test_catalog_refresh_picks_up_new_template() {
    let (orchestrator, _cluster) = setup().await;

    let mut req = request("custom");
    req.template_id = 42;
    assert!(orchestrator.create_workspace(&req, USER).await.is_err());

    sqlx::query(
        "INSERT INTO space_templates (id, name, image) VALUES (42, 'Custom', 'example/custom:v1')",
    )
    .execute(orchestrator.pool())
    .await
    .unwrap();

    // Cached snapshot still misses until refreshed
    assert!(orchestrator.create_workspace(&req, USER).await.is_err());
    orchestrator.catalog().refresh().await.unwrap();
    orchestrator.create_workspace(&req, USER).await.unwrap();
}
