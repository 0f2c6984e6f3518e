use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use ide_orchestrator::payment::DEFAULT_PAGE_SIZE;
use ide_orchestrator::{CreateOrderRequest, Order, PaymentProduct, Settlement};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Served without authentication.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/api/payment/products", get(list_products))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/payment/order", post(create_order))
        .route("/api/payment/orders", get(list_orders))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/api/admin/payment/settle", post(settle_order))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderPageQuery {
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn first_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SettleOrderRequest {
    pub order_no: String,
    /// Transaction number reported by the payment gateway.
    pub trade_no: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettleOrderResponse {
    pub order_no: String,
    /// False when the order had already been settled earlier.
    pub settled: bool,
    pub expire_time: Option<DateTime<Utc>>,
}

#[utoipa::path(
    get,
    path = "/api/payment/products",
    responses((status = 200, description = "Products on sale", body = [PaymentProduct])),
    tag = "payment"
)]
pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<PaymentProduct>>> {
    Ok(Json(state.payments.products().await?))
}

#[utoipa::path(
    post,
    path = "/api/payment/order",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Pending order", body = Order),
        (status = 400, description = "Unknown product or missing payment method")
    ),
    tag = "payment"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Json<Order>> {
    let order = state.payments.create_order(user.user_id, &req).await?;
    Ok(Json(order))
}

#[utoipa::path(
    get,
    path = "/api/payment/orders",
    params(OrderPageQuery),
    responses((status = 200, description = "Orders of the caller, newest first", body = [Order])),
    tag = "payment"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<OrderPageQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let orders = state
        .payments
        .orders_for_user(user.user_id, query.page, query.page_size)
        .await?;
    Ok(Json(orders))
}

#[utoipa::path(
    post,
    path = "/api/admin/payment/settle",
    request_body = SettleOrderRequest,
    responses(
        (status = 200, description = "Order paid and VIP extended", body = SettleOrderResponse),
        (status = 400, description = "Closed order or missing trade number"),
        (status = 403, description = "Missing or invalid admin token"),
        (status = 404, description = "Unknown order")
    ),
    tag = "admin"
)]
pub async fn settle_order(
    State(state): State<AppState>,
    Json(req): Json<SettleOrderRequest>,
) -> ApiResult<Json<SettleOrderResponse>> {
    if req.trade_no.trim().is_empty() {
        return Err(ApiError::BadRequest("trade_no is required".to_string()));
    }

    let response = match state.payments.settle_order(&req.order_no, &req.trade_no).await? {
        Settlement::Settled { expire_time, .. } => SettleOrderResponse {
            order_no: req.order_no,
            settled: true,
            expire_time: Some(expire_time),
        },
        Settlement::AlreadyPaid => SettleOrderResponse {
            order_no: req.order_no,
            settled: false,
            expire_time: None,
        },
    };
    Ok(Json(response))
}
