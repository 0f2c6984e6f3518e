use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::{Query, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use ide_orchestrator::{CreateWorkspaceRequest, Operation, OrchestratorError, Workspace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

/// Only https clone URLs of `.git` repositories are accepted.
static GIT_REPOSITORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://\S+\.git$")
        .expect("Git repository regex should compile - this is a static pattern")
});

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/workspace/list", get(list_workspaces))
        .route("/api/workspace", post(create_workspace).delete(delete_workspace))
        .route("/api/workspace/cas", post(create_and_start_workspace))
        .route("/api/workspace/start", put(start_workspace))
        .route("/api/workspace/stop", put(stop_workspace))
        .route("/api/workspace/name", put(modify_name))
        .route("/api/workspace/operations", get(list_operations))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkspaceIdRequest {
    pub id: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WorkspaceIdQuery {
    pub id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModifyNameRequest {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Request-shape checks that need no store access.
fn validate_creation(req: &CreateWorkspaceRequest) -> ApiResult<()> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("workspace name is required".to_string()));
    }

    if let Some(url) = req.git_repository.as_deref().filter(|url| !url.is_empty()) {
        if !GIT_REPOSITORY_REGEX.is_match(url) {
            return Err(ApiError::BadRequest(format!(
                "git repository must be an https URL ending in .git: {url}"
            )));
        }
    }

    Ok(())
}

/// Validation plus entitlement gating, done before the orchestrator sees the request.
async fn admit_creation(
    state: &AppState,
    user: &AuthenticatedUser,
    req: &CreateWorkspaceRequest,
) -> ApiResult<()> {
    validate_creation(req)?;

    let is_vip = state.subscriptions.is_vip(user.user_id).await;
    let template = state
        .orchestrator
        .catalog()
        .get_template(req.template_id)
        .await?;
    state
        .policy
        .check_creation(is_vip, req.spec_id, template.as_ref())?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/workspace/list",
    responses((status = 200, description = "Live workspaces of the caller", body = [Workspace])),
    tag = "workspace"
)]
pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Vec<Workspace>>> {
    let workspaces = state
        .orchestrator
        .list_workspaces(user.user_id, &user.uid)
        .await?;

    Ok(Json(workspaces))
}

#[utoipa::path(
    post,
    path = "/api/workspace",
    request_body = CreateWorkspaceRequest,
    responses(
        (status = 200, description = "Workspace reserved", body = Workspace),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Spec or template requires VIP"),
        (status = 409, description = "Duplicate name or quota reached")
    ),
    tag = "workspace"
)]
pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<Workspace>> {
    admit_creation(&state, &user, &req).await?;

    let workspace = state.orchestrator.create_workspace(&req, user.user_id).await?;

    Ok(Json(workspace))
}

#[utoipa::path(
    post,
    path = "/api/workspace/cas",
    request_body = CreateWorkspaceRequest,
    responses(
        (status = 200, description = "Workspace created and running", body = Workspace),
        (status = 409, description = "Already exists in the cluster, duplicate name or quota reached"),
        (status = 502, description = "Cluster controller unavailable"),
        (status = 504, description = "Cluster controller timed out")
    ),
    tag = "workspace"
)]
pub async fn create_and_start_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<Workspace>> {
    admit_creation(&state, &user, &req).await?;

    let workspace = state
        .orchestrator
        .create_and_start_workspace(&req, user.user_id, &user.uid)
        .await?;

    Ok(Json(workspace))
}

#[utoipa::path(
    put,
    path = "/api/workspace/start",
    request_body = WorkspaceIdRequest,
    responses(
        (status = 200, description = "Workspace running", body = Workspace),
        (status = 404, description = "No such workspace")
    ),
    tag = "workspace"
)]
pub async fn start_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<WorkspaceIdRequest>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state
        .orchestrator
        .start_workspace(req.id, user.user_id, &user.uid)
        .await?;

    Ok(Json(workspace))
}

#[utoipa::path(
    put,
    path = "/api/workspace/stop",
    request_body = WorkspaceIdRequest,
    responses(
        (status = 200, description = "Workspace stopped, or was not running", body = MessageResponse),
        (status = 404, description = "No such workspace")
    ),
    tag = "workspace"
)]
pub async fn stop_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<WorkspaceIdRequest>,
) -> ApiResult<Json<MessageResponse>> {
    match state
        .orchestrator
        .stop_workspace(req.id, user.user_id, &user.uid)
        .await
    {
        Ok(()) => Ok(MessageResponse::new("Workspace stopped")),
        Err(OrchestratorError::WorkSpaceIsNotRunning) => {
            debug!(id = req.id, "Stop requested for a workspace that is not running");
            Ok(MessageResponse::new("Workspace is not running"))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    delete,
    path = "/api/workspace",
    params(WorkspaceIdQuery),
    responses(
        (status = 200, description = "Workspace deleted", body = MessageResponse),
        (status = 404, description = "No such workspace"),
        (status = 409, description = "Workspace is running")
    ),
    tag = "workspace"
)]
pub async fn delete_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<WorkspaceIdQuery>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .orchestrator
        .delete_workspace(query.id, user.user_id, &user.uid)
        .await?;

    Ok(MessageResponse::new("Workspace deleted"))
}

#[utoipa::path(
    put,
    path = "/api/workspace/name",
    request_body = ModifyNameRequest,
    responses(
        (status = 200, description = "Workspace renamed", body = MessageResponse),
        (status = 409, description = "Name already in use")
    ),
    tag = "workspace"
)]
pub async fn modify_name(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<ModifyNameRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .orchestrator
        .modify_name(req.name.trim(), req.id, user.user_id)
        .await?;

    Ok(MessageResponse::new("Workspace renamed"))
}

#[utoipa::path(
    get,
    path = "/api/workspace/operations",
    params(WorkspaceIdQuery),
    responses(
        (status = 200, description = "Cluster commands issued for the workspace, newest first", body = [Operation]),
        (status = 404, description = "No such workspace")
    ),
    tag = "workspace"
)]
pub async fn list_operations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<WorkspaceIdQuery>,
) -> ApiResult<Json<Vec<Operation>>> {
    let operations = state.orchestrator.operations(query.id, user.user_id).await?;

    Ok(Json(operations))
}
