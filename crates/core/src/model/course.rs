use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, PackageId};
use crate::model::outline::CourseOutline;
use crate::model::progress::CompletionStatus;

/// Dashboard/library view of one course, as cached locally.
///
/// Progress fields are only ever written by the reconciler, and always as a
/// whole-record replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
    pub scorm_package_id: Option<PackageId>,
    pub status: CompletionStatus,
    pub progress: u8,
    pub completed_modules: u32,
    pub total_modules: u32,
}

impl CourseRecord {
    /// A fresh, not-started record for a course outline.
    #[must_use]
    pub fn from_outline(outline: &CourseOutline) -> Self {
        let first_package = outline
            .modules()
            .first()
            .and_then(|m| m.lessons().first())
            .map(|l| l.package_id().clone());
        Self {
            id: outline.course_id().clone(),
            title: outline.title().to_owned(),
            scorm_package_id: first_package,
            status: CompletionStatus::NotStarted,
            progress: 0,
            completed_modules: 0,
            total_modules: u32::try_from(outline.modules().len()).unwrap_or(u32::MAX),
        }
    }

    /// Returns the replacement record carrying new progress.
    ///
    /// Never lowers progress already recorded in the cache.
    #[must_use]
    pub fn with_progress(&self, progress: u8, completed_modules: u32) -> Self {
        let progress = progress.min(100).max(self.progress);
        Self {
            progress,
            status: CompletionStatus::from_percentage(progress),
            completed_modules: completed_modules.max(self.completed_modules),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CourseRecord {
        CourseRecord {
            id: CourseId::new("c1"),
            title: "Ladder safety".into(),
            scorm_package_id: Some(PackageId::new("pkg")),
            status: CompletionStatus::NotStarted,
            progress: 0,
            completed_modules: 0,
            total_modules: 2,
        }
    }

    #[test]
    fn with_progress_derives_status() {
        let next = record().with_progress(40, 0);
        assert_eq!(next.progress, 40);
        assert_eq!(next.status, CompletionStatus::InProgress);
        assert_eq!(next.title, "Ladder safety");

        let done = next.with_progress(100, 2);
        assert_eq!(done.status, CompletionStatus::Completed);
        assert_eq!(done.completed_modules, 2);
    }

    #[test]
    fn with_progress_never_regresses() {
        let next = record().with_progress(70, 1).with_progress(30, 0);
        assert_eq!(next.progress, 70);
        assert_eq!(next.completed_modules, 1);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["scormPackageId"], "pkg");
        assert_eq!(json["status"], "NOT_STARTED");
    }
}
