use crate::{
    auth::AuthenticatedUser, error::ApiResult, routes::workspaces::MessageResponse,
    state::AppState,
};
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use ide_orchestrator::{Spec, Template};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/template/list", get(list_templates))
        .route("/api/spec/list", get(list_specs))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/api/admin/catalog/refresh", post(refresh_catalog))
}

#[utoipa::path(
    get,
    path = "/api/template/list",
    responses((status = 200, description = "Templates the caller may use", body = [Template])),
    tag = "catalog"
)]
pub async fn list_templates(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Vec<Template>>> {
    let templates = state.orchestrator.catalog().templates().await?;
    let is_vip = state.subscriptions.is_vip(user.user_id).await;

    Ok(Json(state.policy.visible_templates(is_vip, templates)))
}

#[utoipa::path(
    get,
    path = "/api/spec/list",
    responses((status = 200, description = "Hardware specs the caller may use", body = [Spec])),
    tag = "catalog"
)]
pub async fn list_specs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Vec<Spec>>> {
    let specs = state.orchestrator.catalog().specs().await?;
    let is_vip = state.subscriptions.is_vip(user.user_id).await;

    Ok(Json(state.policy.visible_specs(is_vip, specs)))
}

#[utoipa::path(
    post,
    path = "/api/admin/catalog/refresh",
    responses(
        (status = 200, description = "Catalog reloaded", body = MessageResponse),
        (status = 403, description = "Missing or invalid admin token")
    ),
    tag = "admin"
)]
pub async fn refresh_catalog(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    state.orchestrator.catalog().refresh().await?;
    info!("Catalog refreshed on admin request");

    Ok(Json(MessageResponse {
        message: "Catalog refreshed".to_string(),
    }))
}
