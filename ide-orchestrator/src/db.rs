use crate::error::Result;
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Open (creating if needed) the SQLite database at `db_path`.
#[instrument(fields(db_path = %db_path.display()))]
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    Ok(pool)
}

/// Apply the embedded schema and catalog seed migrations.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}

/// Copy the database aside before migrating. Returns `None` when there is nothing to back up.
pub fn backup_database(db_path: &Path) -> Result<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }

    let backup_path = db_path.with_extension(format!("db.backup.{}", Utc::now().timestamp()));
    std::fs::copy(db_path, &backup_path)?;

    Ok(Some(backup_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ide.db");

        let pool = create_pool(&db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let (templates,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM space_templates")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(templates > 0);
        assert!(db_path.exists());
    }

    #[test]
    fn test_backup_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let backup = backup_database(&dir.path().join("absent.db")).unwrap();
        assert!(backup.is_none());
    }

    #[test]
    fn test_backup_copies_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ide.db");
        std::fs::write(&db_path, b"sqlite").unwrap();

        let backup = backup_database(&db_path).unwrap().unwrap();
        assert_eq!(std::fs::read(backup).unwrap(), b"sqlite");
    }
}
