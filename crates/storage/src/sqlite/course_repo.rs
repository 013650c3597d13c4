use chrono::Utc;
use portal_core::model::{CourseId, CourseRecord};

use super::SqliteRepository;
use super::mapping::map_course_row;
use crate::repository::{CourseCacheRepository, StorageError};

#[async_trait::async_trait]
impl CourseCacheRepository for SqliteRepository {
    async fn get_course(&self, id: &CourseId) -> Result<Option<CourseRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, scorm_package_id, status, progress, completed_modules, total_modules
            FROM course_cache WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_course_row).transpose()
    }

    async fn replace_course(&self, record: &CourseRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO course_cache (
                id, title, scorm_package_id, status, progress,
                completed_modules, total_modules, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                scorm_package_id = excluded.scorm_package_id,
                status = excluded.status,
                progress = excluded.progress,
                completed_modules = excluded.completed_modules,
                total_modules = excluded.total_modules,
                updated_at = excluded.updated_at
            ",
        )
        .bind(record.id.as_str())
        .bind(record.title.as_str())
        .bind(record.scorm_package_id.as_ref().map(|p| p.as_str().to_owned()))
        .bind(record.status.as_wire())
        .bind(i64::from(record.progress.min(100)))
        .bind(i64::from(record.completed_modules))
        .bind(i64::from(record.total_modules))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn list_courses(&self) -> Result<Vec<CourseRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, scorm_package_id, status, progress, completed_modules, total_modules
            FROM course_cache
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(map_course_row(&row)?);
        }
        Ok(courses)
    }
}
