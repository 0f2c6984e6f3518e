//! Persistence for workspace records.
//!
//! The store is the system of record for workspace existence. Quota and name
//! uniqueness are enforced here at write time so concurrent requests cannot
//! slip past the orchestrator's pre-checks.

use crate::error::{OrchestratorError, Result};
use crate::workspace::{RunningStatus, SpaceStatus, Workspace};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

/// Columns of a workspace row that exist before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub sid: String,
    pub user_id: i64,
    pub template_id: i64,
    pub spec_id: i64,
    pub name: String,
    pub git_repository: Option<String>,
    pub environment: Option<String>,
    pub create_time: DateTime<Utc>,
}

const WORKSPACE_COLUMNS: &str = "id, sid, user_id, template_id, spec_id, name, git_repository, \
     environment, status, create_time, delete_time, start_time, stop_time, total_time";

#[derive(Clone)]
pub struct WorkspaceStore {
    pool: SqlitePool,
}

impl WorkspaceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of workspaces the user holds, not counting deleted ones.
    #[instrument(skip(self))]
    pub async fn count_by_user(&self, user_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workspaces WHERE user_id = ? AND status != 'deleted'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn find_by_user_and_name(
        &self,
        user_id: i64,
        name: &str,
    ) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces
             WHERE user_id = ? AND name = ? AND status != 'deleted'"
        ))
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Lookup scoped to the owner; a row owned by someone else is reported as absent.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64, user_id: i64) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Insert an `uncreated` workspace unless the user already holds `max_count`.
    ///
    /// Returns `Ok(None)` when the quota check inside the statement rejects the
    /// insert. A name collision with a live workspace maps to `NameDuplicate`.
    #[instrument(skip(self, workspace), fields(user_id = workspace.user_id, sid = %workspace.sid))]
    pub async fn insert(&self, workspace: &NewWorkspace, max_count: i64) -> Result<Option<i64>> {
        let result = sqlx::query(
            "INSERT INTO workspaces
                (sid, user_id, template_id, spec_id, name, git_repository, environment,
                 status, create_time, total_time)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, 0
             WHERE (SELECT COUNT(*) FROM workspaces
                    WHERE user_id = ? AND status != 'deleted') < ?",
        )
        .bind(&workspace.sid)
        .bind(workspace.user_id)
        .bind(workspace.template_id)
        .bind(workspace.spec_id)
        .bind(&workspace.name)
        .bind(&workspace.git_repository)
        .bind(&workspace.environment)
        .bind(SpaceStatus::Uncreated)
        .bind(workspace.create_time.timestamp())
        .bind(workspace.user_id)
        .bind(max_count)
        .execute(&self.pool)
        .await
        .map_err(|e| name_conflict(e, &workspace.name))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(result.last_insert_rowid()))
    }

    /// Move `id` from `from` to `to` only if it is still in `from`.
    ///
    /// Returns whether this call performed the transition.
    #[instrument(skip(self))]
    pub async fn transition_status(
        &self,
        id: i64,
        from: SpaceStatus,
        to: SpaceStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE workspaces SET status = ? WHERE id = ? AND status = ?")
            .bind(to)
            .bind(id)
            .bind(from)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Rename a live workspace owned by `user_id`. Returns the number of rows touched.
    #[instrument(skip(self))]
    pub async fn update_name(&self, name: &str, id: i64, user_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE workspaces SET name = ? WHERE id = ? AND user_id = ? AND status != 'deleted'",
        )
        .bind(name)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| name_conflict(e, name))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: i64, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Live workspaces of a user, oldest first.
    #[instrument(skip(self))]
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces
             WHERE user_id = ? AND status != 'deleted' ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Stamp the start of a running period.
    pub async fn record_started(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE workspaces SET start_time = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Close the current running period and fold it into `total_time`.
    pub async fn record_stopped(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let now = at.timestamp();
        sqlx::query(
            "UPDATE workspaces
             SET stop_time = ?,
                 total_time = total_time + MAX(0, ? - COALESCE(start_time, ?)),
                 start_time = NULL
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn name_conflict(err: sqlx::Error, name: &str) -> OrchestratorError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            OrchestratorError::NameDuplicate(name.to_string())
        }
        _ => OrchestratorError::Database(err),
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: i64,
    sid: String,
    user_id: i64,
    template_id: i64,
    spec_id: i64,
    name: String,
    git_repository: Option<String>,
    environment: Option<String>,
    status: SpaceStatus,
    create_time: i64,
    delete_time: Option<i64>,
    start_time: Option<i64>,
    stop_time: Option<i64>,
    total_time: i64,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            sid: row.sid,
            user_id: row.user_id,
            template_id: row.template_id,
            spec_id: row.spec_id,
            name: row.name,
            git_repository: row.git_repository,
            environment: row.environment,
            status: row.status,
            running_status: RunningStatus::NotRunning,
            template_description: None,
            avatar: None,
            spec: None,
            create_time: DateTime::from_timestamp(row.create_time, 0).unwrap_or_default(),
            delete_time: row.delete_time.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            start_time: row.start_time.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            stop_time: row.stop_time.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            total_time: row.total_time,
        }
    }
}
