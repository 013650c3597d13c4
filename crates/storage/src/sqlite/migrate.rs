use chrono::Utc;
use sqlx::SqlitePool;

/// Runs pending schema migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: dashboard course cache.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS course_cache (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    scorm_package_id TEXT,
                    status TEXT NOT NULL
                        CHECK (status IN ('NOT_STARTED', 'IN_PROGRESS', 'COMPLETED')),
                    progress INTEGER NOT NULL CHECK (progress BETWEEN 0 AND 100),
                    completed_modules INTEGER NOT NULL CHECK (completed_modules >= 0),
                    total_modules INTEGER NOT NULL CHECK (total_modules >= 0),
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
            .bind(1_i64)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
    }

    Ok(())
}
