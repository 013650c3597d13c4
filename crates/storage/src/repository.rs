use async_trait::async_trait;
use portal_core::model::{CourseId, CourseRecord};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Local cache of the learner's dashboard/library courses.
///
/// Writes are whole-record replacements keyed by course id; there is no
/// partial update.
#[async_trait]
pub trait CourseCacheRepository: Send + Sync {
    /// Fetch a cached course by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn get_course(&self, id: &CourseId) -> Result<Option<CourseRecord>, StorageError>;

    /// Insert or fully replace the record for `record.id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn replace_course(&self, record: &CourseRecord) -> Result<(), StorageError>;

    /// List cached courses ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn list_courses(&self) -> Result<Vec<CourseRecord>, StorageError>;
}

/// In-memory cache for tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<BTreeMap<CourseId, CourseRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourseCacheRepository for InMemoryRepository {
    async fn get_course(&self, id: &CourseId) -> Result<Option<CourseRecord>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn replace_course(&self, record: &CourseRecord) -> Result<(), StorageError> {
        let mut guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list_courses(&self) -> Result<Vec<CourseRecord>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.values().cloned().collect())
    }
}

/// Storage handles behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseCacheRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let courses: Arc<dyn CourseCacheRepository> = Arc::new(InMemoryRepository::new());
        Self { courses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::model::{CompletionStatus, PackageId};

    fn record(id: &str, progress: u8) -> CourseRecord {
        CourseRecord {
            id: CourseId::new(id),
            title: format!("Course {id}"),
            scorm_package_id: Some(PackageId::new(format!("pkg-{id}"))),
            status: CompletionStatus::from_percentage(progress),
            progress,
            completed_modules: 0,
            total_modules: 3,
        }
    }

    #[tokio::test]
    async fn replace_overwrites_whole_record() {
        let repo = InMemoryRepository::new();
        repo.replace_course(&record("c1", 10)).await.unwrap();

        let mut next = record("c1", 55);
        next.title = "Renamed".into();
        repo.replace_course(&next).await.unwrap();

        let fetched = repo.get_course(&CourseId::new("c1")).await.unwrap().unwrap();
        assert_eq!(fetched, next);
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let repo = InMemoryRepository::new();
        repo.replace_course(&record("b", 0)).await.unwrap();
        repo.replace_course(&record("a", 0)).await.unwrap();
        let ids: Vec<_> = repo
            .list_courses()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_course_is_none() {
        let storage = Storage::in_memory();
        assert!(
            storage
                .courses
                .get_course(&CourseId::new("nope"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
