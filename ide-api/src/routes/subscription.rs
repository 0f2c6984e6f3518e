use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use ide_orchestrator::subscription::MAX_EXTENSION_DAYS;
use ide_orchestrator::{SubscriptionStats, UserSubscription, VipInfo};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/user/vip", get(vip_info))
        .route("/api/user/subscription/history", get(subscription_history))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/subscription/extend", post(extend_subscription))
        .route("/api/admin/subscription/stats", get(subscription_stats))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtendSubscriptionRequest {
    pub user_id: i64,
    pub days: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtendSubscriptionResponse {
    pub user_id: i64,
    pub expire_time: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/user/vip",
    responses((status = 200, description = "Subscription state of the caller", body = VipInfo)),
    tag = "subscription"
)]
pub async fn vip_info(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<VipInfo> {
    Json(state.subscriptions.vip_info(user.user_id).await)
}

#[utoipa::path(
    get,
    path = "/api/user/subscription/history",
    responses(
        (status = 200, description = "Granted periods, newest first", body = [UserSubscription])
    ),
    tag = "subscription"
)]
pub async fn subscription_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Vec<UserSubscription>>> {
    Ok(Json(state.subscriptions.history(user.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/subscription/extend",
    request_body = ExtendSubscriptionRequest,
    responses(
        (status = 200, description = "New expiry", body = ExtendSubscriptionResponse),
        (status = 400, description = "Unknown user or days out of range"),
        (status = 403, description = "Missing or invalid admin token")
    ),
    tag = "admin"
)]
pub async fn extend_subscription(
    State(state): State<AppState>,
    Json(req): Json<ExtendSubscriptionRequest>,
) -> ApiResult<Json<ExtendSubscriptionResponse>> {
    if req.days <= 0 {
        return Err(ApiError::BadRequest("days must be positive".to_string()));
    }
    if req.days > MAX_EXTENSION_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must not exceed {MAX_EXTENSION_DAYS}"
        )));
    }

    let expire_time = state
        .subscriptions
        .extend_subscription(req.user_id, req.days)
        .await?;

    Ok(Json(ExtendSubscriptionResponse {
        user_id: req.user_id,
        expire_time,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/subscription/stats",
    responses(
        (status = 200, description = "Subscriber counts", body = SubscriptionStats),
        (status = 403, description = "Missing or invalid admin token")
    ),
    tag = "admin"
)]
pub async fn subscription_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<SubscriptionStats>> {
    Ok(Json(state.subscriptions.stats().await?))
}
