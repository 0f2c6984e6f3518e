//! Journal of cluster commands.
//!
//! Each create/start/stop/delete issued to the controller is recorded with the
//! workspace `sid`, so a disagreement between the store and the cluster can be
//! traced and reconciled after the fact. Completion writes never fail the
//! operation they describe. A create is only issued once its entry exists,
//! since delete relies on it to decide whether remote teardown is needed.

use crate::error::Result;
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Operation {
    pub id: String,
    pub workspace_id: i64,
    pub sid: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Start,
    Stop,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Clone)]
pub struct OperationJournal {
    pool: SqlitePool,
}

impl OperationJournal {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a pending command. Returns `None` if the journal could not be written.
    pub async fn begin(
        &self,
        workspace: &Workspace,
        operation_type: OperationType,
    ) -> Option<String> {
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO operations
                (id, workspace_id, sid, user_id, operation_type, status, started_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(workspace.id)
        .bind(&workspace.sid)
        .bind(workspace.user_id)
        .bind(operation_type)
        .bind(OperationStatus::Pending)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Some(id),
            Err(e) => {
                warn!(sid = %workspace.sid, ?operation_type, "Failed to journal operation: {}", e);
                None
            }
        }
    }

    pub async fn succeed(&self, id: Option<String>) {
        self.complete(id, OperationStatus::Success, None).await;
    }

    pub async fn fail(&self, id: Option<String>, error: &str) {
        self.complete(id, OperationStatus::Failed, Some(error)).await;
    }

    async fn complete(&self, id: Option<String>, status: OperationStatus, error: Option<&str>) {
        let Some(id) = id else {
            return;
        };

        let result = sqlx::query(
            "UPDATE operations SET status = ?, completed_at = ?, error = ? WHERE id = ?",
        )
        .bind(status)
        .bind(Utc::now().timestamp())
        .bind(error)
        .bind(&id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(operation_id = %id, "Failed to complete journal entry: {}", e);
        }
    }

    /// Whether a create command was ever issued for `sid`, whatever its outcome.
    pub async fn has_create_attempt(&self, sid: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM operations WHERE sid = ? AND operation_type = 'create'",
        )
        .bind(sid)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Entries for one workspace, newest first.
    pub async fn list_for_workspace(&self, workspace_id: i64) -> Result<Vec<Operation>> {
        let rows = sqlx::query_as::<_, OperationRow>(
            "SELECT id, workspace_id, sid, operation_type, status, started_at, completed_at, error
             FROM operations WHERE workspace_id = ? ORDER BY started_at DESC, rowid DESC",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct OperationRow {
    id: String,
    workspace_id: i64,
    sid: String,
    operation_type: OperationType,
    status: OperationStatus,
    started_at: i64,
    completed_at: Option<i64>,
    error: Option<String>,
}

impl From<OperationRow> for Operation {
    fn from(row: OperationRow) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            sid: row.sid,
            operation_type: row.operation_type,
            status: row.status,
            started_at: DateTime::from_timestamp(row.started_at, 0).unwrap_or_default(),
            completed_at: row
                .completed_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            error: row.error,
        }
    }
}
