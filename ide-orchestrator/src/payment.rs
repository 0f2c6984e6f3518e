//! VIP products and orders.
//!
//! Orders are recorded locally as `pending`. The gateway exchange itself
//! happens outside this service; once a payment is confirmed,
//! [`PaymentService::settle_order`] marks the order paid and extends the
//! buyer's subscription in the same transaction, so an order grants its
//! period exactly once.

use crate::error::{OrchestratorError, Result};
use crate::subscription::grant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PaymentProduct {
    pub id: i64,
    pub name: String,
    /// `day`, `week` or `month`; recorded as the subscription type when paid.
    pub product_type: String,
    pub duration_days: i64,
    pub price_cents: i64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: i64,
    pub order_no: String,
    pub user_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub product_type: String,
    pub amount_cents: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub trade_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub product_id: i64,
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The order was paid by this call and the subscription now ends at `expire_time`.
    Settled {
        order_id: i64,
        user_id: i64,
        expire_time: DateTime<Utc>,
    },
    /// The order had already been settled; nothing changed.
    AlreadyPaid,
}

/// `LIMIT` and `OFFSET` for a 1-based page. Out-of-range input falls back to defaults.
pub fn page_window(page: i64, page_size: i64) -> (i64, i64) {
    let page = page.max(1);
    let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
        page_size
    } else {
        DEFAULT_PAGE_SIZE
    };
    (page_size, (page - 1).saturating_mul(page_size))
}

fn generate_order_no(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ORDER{}{}", now.format("%Y%m%d%H%M%S"), &suffix[..12])
}

const ORDER_COLUMNS: &str = "id, order_no, user_id, product_id, product_name, product_type, \
     amount_cents, status, payment_method, trade_no, paid_at, create_time, update_time";

#[derive(Clone)]
pub struct PaymentService {
    pool: SqlitePool,
}

impl PaymentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Products currently on sale, shortest first.
    pub async fn products(&self) -> Result<Vec<PaymentProduct>> {
        let products = sqlx::query_as::<_, PaymentProduct>(
            "SELECT id, name, product_type, duration_days, price_cents, description
             FROM payment_products WHERE enabled = 1 ORDER BY duration_days, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    async fn product(&self, id: i64) -> Result<Option<PaymentProduct>> {
        let product = sqlx::query_as::<_, PaymentProduct>(
            "SELECT id, name, product_type, duration_days, price_cents, description
             FROM payment_products WHERE id = ? AND enabled = 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Record a pending order for `user_id`, priced from the product catalog.
    #[instrument(skip(self, req), fields(product_id = req.product_id))]
    pub async fn create_order(&self, user_id: i64, req: &CreateOrderRequest) -> Result<Order> {
        let payment_method = req.payment_method.trim();
        if payment_method.is_empty() {
            return Err(OrchestratorError::ParamInvalid(
                "payment method is required".to_string(),
            ));
        }

        let product = self
            .product(req.product_id)
            .await?
            .ok_or(OrchestratorError::ProductNotFound(req.product_id))?;

        let now = Utc::now();
        let order_no = generate_order_no(now);
        let result = sqlx::query(
            "INSERT INTO orders
                (order_no, user_id, product_id, product_name, product_type, amount_cents,
                 status, payment_method, create_time, update_time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order_no)
        .bind(user_id)
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.product_type)
        .bind(product.price_cents)
        .bind(OrderStatus::Pending)
        .bind(payment_method)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        info!(user_id, %order_no, product = %product.product_type, "Order created");

        let created = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Ok(Order {
            id: result.last_insert_rowid(),
            order_no,
            user_id,
            product_id: product.id,
            product_name: product.name,
            product_type: product.product_type,
            amount_cents: product.price_cents,
            status: OrderStatus::Pending,
            payment_method: payment_method.to_string(),
            trade_no: None,
            paid_at: None,
            create_time: created,
            update_time: created,
        })
    }

    /// Orders of a user, newest first.
    pub async fn orders_for_user(
        &self,
        user_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Order>> {
        let (limit, offset) = page_window(page, page_size);
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?
             ORDER BY create_time DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Mark a confirmed payment and grant the product's period to the buyer.
    ///
    /// Settling an order twice is a no-op reported as [`Settlement::AlreadyPaid`].
    #[instrument(skip(self))]
    pub async fn settle_order(&self, order_no: &str, trade_no: &str) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;

        let order: OrderRow =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = ?"))
                .bind(order_no)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| OrchestratorError::OrderNotFound(order_no.to_string()))?;

        match order.status {
            OrderStatus::Paid => {
                info!(order_no, "Order already settled");
                return Ok(Settlement::AlreadyPaid);
            }
            OrderStatus::Closed => {
                warn!(order_no, "Payment confirmed for a closed order");
                return Err(OrchestratorError::ParamInvalid(format!(
                    "order {order_no} is closed"
                )));
            }
            OrderStatus::Pending => {}
        }

        let (duration_days,): (i64,) =
            sqlx::query_as("SELECT duration_days FROM payment_products WHERE id = ?")
                .bind(order.product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(OrchestratorError::ProductNotFound(order.product_id))?;

        let now = Utc::now().timestamp();
        let updated = sqlx::query(
            "UPDATE orders SET status = ?, trade_no = ?, paid_at = ?, update_time = ?
             WHERE id = ? AND status = ?",
        )
        .bind(OrderStatus::Paid)
        .bind(trade_no)
        .bind(now)
        .bind(now)
        .bind(order.id)
        .bind(OrderStatus::Pending)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(Settlement::AlreadyPaid);
        }

        let (_, expire_time) = grant(
            &mut *tx,
            order.user_id,
            duration_days,
            &order.product_type,
            Some(order.id),
        )
        .await?;
        tx.commit().await?;

        info!(order_no, user_id = order.user_id, %expire_time, "Order settled");
        Ok(Settlement::Settled {
            order_id: order.id,
            user_id: order.user_id,
            expire_time,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_no: String,
    user_id: i64,
    product_id: i64,
    product_name: String,
    product_type: String,
    amount_cents: i64,
    status: OrderStatus,
    payment_method: String,
    trade_no: Option<String>,
    paid_at: Option<i64>,
    create_time: i64,
    update_time: i64,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            order_no: row.order_no,
            user_id: row.user_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_type: row.product_type,
            amount_cents: row.amount_cents,
            status: row.status,
            payment_method: row.payment_method,
            trade_no: row.trade_no,
            paid_at: row.paid_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            create_time: DateTime::from_timestamp(row.create_time, 0).unwrap_or_default(),
            update_time: DateTime::from_timestamp(row.update_time, 0).unwrap_or_default(),
        }
    }
}
