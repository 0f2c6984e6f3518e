//! VIP subscription lookup and entitlement rules.
//!
//! Subscription state can change underneath any request: the periodic expiry
//! sweep flips users back to normal at any time, so callers re-check per
//! request instead of caching the answer.

use crate::catalog::{Spec, Template};
use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

pub const VIP_STATUS_NORMAL: i64 = 0;
pub const VIP_STATUS_VIP: i64 = 1;

/// Spec id that non-VIP callers are limited to.
pub const TEST_SPEC_ID: i64 = 4;

/// Largest extension an operator may grant in one call.
pub const MAX_EXTENSION_DAYS: i64 = 3650;

/// Subscription type recorded for operator grants, as opposed to paid orders.
pub const ADMIN_GRANT_TYPE: &str = "admin";

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VipInfo {
    pub is_active: bool,
    pub days_left: i64,
    pub expire_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
}

/// One granted period, from a paid order or an operator extension.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSubscription {
    pub id: i64,
    pub user_id: i64,
    /// Product type of the order (`day`, `week`, `month`) or `admin`.
    pub subscription_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub order_id: Option<i64>,
    pub create_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionStats {
    pub total_vip_users: i64,
    pub day_subscribers: i64,
    pub week_subscribers: i64,
    pub month_subscribers: i64,
    /// Users whose VIP lapsed since midnight UTC.
    pub expired_today: i64,
}

fn is_active(vip_status: i64, expire_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    vip_status == VIP_STATUS_VIP && expire_time.is_some_and(|expiry| expiry > now)
}

/// Extend `user_id` by `days` on `conn` and record the granted period.
///
/// The period starts at the current expiry while the subscription is active,
/// otherwise now. Returns the `(start, end)` of the period.
pub(crate) async fn grant(
    conn: &mut SqliteConnection,
    user_id: i64,
    days: i64,
    subscription_type: &str,
    order_id: Option<i64>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if days <= 0 {
        return Err(OrchestratorError::ParamInvalid(format!(
            "days must be positive, got {days}"
        )));
    }

    let row: Option<(i64, Option<i64>)> =
        sqlx::query_as("SELECT vip_status, vip_expire_time FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((status, expiry)) = row else {
        return Err(OrchestratorError::ParamInvalid(format!("unknown user {user_id}")));
    };

    let now = Utc::now();
    let expiry = expiry.and_then(|ts| DateTime::from_timestamp(ts, 0));
    let start = match expiry {
        Some(expiry) if is_active(status, Some(expiry), now) => expiry,
        _ => now,
    };
    let end = Duration::try_days(days)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or_else(|| {
            OrchestratorError::ParamInvalid(format!("cannot extend subscription by {days} days"))
        })?;

    sqlx::query("UPDATE users SET vip_status = ?, vip_expire_time = ? WHERE id = ?")
        .bind(VIP_STATUS_VIP)
        .bind(end.timestamp())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO user_subscriptions
            (user_id, subscription_type, start_time, end_time, status, order_id, create_time)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(subscription_type)
    .bind(start.timestamp())
    .bind(end.timestamp())
    .bind(SubscriptionStatus::Active)
    .bind(order_id)
    .bind(now.timestamp())
    .execute(&mut *conn)
    .await?;

    Ok((start, end))
}

#[derive(Clone)]
pub struct SubscriptionService {
    pool: SqlitePool,
}

impl SubscriptionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load(&self, user_id: i64) -> Result<Option<(i64, Option<DateTime<Utc>>)>> {
        let row: Option<(i64, Option<i64>)> =
            sqlx::query_as("SELECT vip_status, vip_expire_time FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(status, expiry)| {
            (status, expiry.and_then(|ts| DateTime::from_timestamp(ts, 0)))
        }))
    }

    /// A lookup failure is treated as "not VIP" rather than an error.
    #[instrument(skip(self))]
    pub async fn is_vip(&self, user_id: i64) -> bool {
        match self.load(user_id).await {
            Ok(Some((status, expiry))) => is_active(status, expiry, Utc::now()),
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to load VIP status, treating as normal user: {}", e);
                false
            }
        }
    }

    pub async fn vip_info(&self, user_id: i64) -> VipInfo {
        let now = Utc::now();
        let (status, expiry) = match self.load(user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => (VIP_STATUS_NORMAL, None),
            Err(e) => {
                warn!(user_id, "Failed to load VIP info: {}", e);
                (VIP_STATUS_NORMAL, None)
            }
        };

        let is_active = is_active(status, expiry, now);
        let days_left = match (is_active, expiry) {
            (true, Some(expiry)) => (expiry - now).num_days(),
            _ => 0,
        };

        VipInfo {
            is_active,
            days_left,
            expire_time: expiry,
        }
    }

    /// Flip every VIP whose expiry has passed back to normal and close their
    /// lapsed periods. Returns how many users changed.
    #[instrument(skip(self))]
    pub async fn expire_subscriptions(&self) -> Result<u64> {
        let now = Utc::now().timestamp();

        sqlx::query("UPDATE user_subscriptions SET status = ? WHERE status = ? AND end_time <= ?")
            .bind(SubscriptionStatus::Expired)
            .bind(SubscriptionStatus::Active)
            .bind(now)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query(
            "UPDATE users SET vip_status = ?
             WHERE vip_status = ? AND (vip_expire_time IS NULL OR vip_expire_time <= ?)",
        )
        .bind(VIP_STATUS_NORMAL)
        .bind(VIP_STATUS_VIP)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Extend VIP by `days`, stacking on an unexpired subscription.
    #[instrument(skip(self))]
    pub async fn extend_subscription(&self, user_id: i64, days: i64) -> Result<DateTime<Utc>> {
        let mut tx = self.pool.begin().await?;
        let (_, new_expiry) = grant(&mut *tx, user_id, days, ADMIN_GRANT_TYPE, None).await?;
        tx.commit().await?;

        info!(user_id, days, %new_expiry, "Subscription extended");
        Ok(new_expiry)
    }

    /// Granted periods of a user, newest first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<UserSubscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, subscription_type, start_time, end_time, status, order_id,
                    create_time
             FROM user_subscriptions WHERE user_id = ? ORDER BY start_time DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<SubscriptionStats> {
        let now = Utc::now().timestamp();
        let midnight = now - now.rem_euclid(SECONDS_PER_DAY);

        let (total_vip_users,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE vip_status = ? AND vip_expire_time > ?",
        )
        .bind(VIP_STATUS_VIP)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let (expired_today,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE vip_expire_time > ? AND vip_expire_time <= ?",
        )
        .bind(midnight)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT subscription_type, COUNT(DISTINCT user_id) FROM user_subscriptions
             WHERE status = ? AND start_time <= ? AND end_time > ?
             GROUP BY subscription_type",
        )
        .bind(SubscriptionStatus::Active)
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = SubscriptionStats {
            total_vip_users,
            expired_today,
            ..Default::default()
        };
        for (subscription_type, count) in by_type {
            match subscription_type.as_str() {
                "day" => stats.day_subscribers = count,
                "week" => stats.week_subscribers = count,
                "month" => stats.month_subscribers = count,
                _ => {}
            }
        }

        Ok(stats)
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    user_id: i64,
    subscription_type: String,
    start_time: i64,
    end_time: i64,
    status: SubscriptionStatus,
    order_id: Option<i64>,
    create_time: i64,
}

impl From<SubscriptionRow> for UserSubscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            subscription_type: row.subscription_type,
            start_time: DateTime::from_timestamp(row.start_time, 0).unwrap_or_default(),
            end_time: DateTime::from_timestamp(row.end_time, 0).unwrap_or_default(),
            status: row.status,
            order_id: row.order_id,
            create_time: DateTime::from_timestamp(row.create_time, 0).unwrap_or_default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntitlementDenied {
    #[error("Normal users can only use the test spec; upgrade to VIP for other specs")]
    SpecRequiresVip,

    #[error("This template is reserved for VIP users")]
    TemplateRequiresVip,
}

/// What a non-VIP caller may pick from the catalog.
#[derive(Debug, Clone)]
pub struct EntitlementPolicy {
    pub test_spec_id: i64,
    /// Disabled in the current deployment: premium templates are open to everyone.
    pub restrict_premium_templates: bool,
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self {
            test_spec_id: TEST_SPEC_ID,
            restrict_premium_templates: false,
        }
    }
}

impl EntitlementPolicy {
    pub fn check_creation(
        &self,
        is_vip: bool,
        spec_id: i64,
        template: Option<&Template>,
    ) -> std::result::Result<(), EntitlementDenied> {
        if is_vip {
            return Ok(());
        }
        if spec_id != self.test_spec_id {
            return Err(EntitlementDenied::SpecRequiresVip);
        }
        if self.restrict_premium_templates && template.is_some_and(|t| t.premium) {
            return Err(EntitlementDenied::TemplateRequiresVip);
        }
        Ok(())
    }

    pub fn visible_specs(&self, is_vip: bool, specs: Vec<Spec>) -> Vec<Spec> {
        if is_vip {
            return specs;
        }
        specs
            .into_iter()
            .filter(|spec| spec.id == self.test_spec_id)
            .collect()
    }

    pub fn visible_templates(&self, is_vip: bool, templates: Vec<Template>) -> Vec<Template> {
        if is_vip || !self.restrict_premium_templates {
            return templates;
        }
        templates.into_iter().filter(|t| !t.premium).collect()
    }
}
