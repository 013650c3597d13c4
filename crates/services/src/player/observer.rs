use portal_core::model::CourseId;

/// Upward notifications for the hosting application.
pub trait ProgressObserver: Send + Sync {
    /// Called on every accepted forward transition.
    fn on_progress(&self, course_id: &CourseId, percentage: u8, completed_units: usize);

    /// Called once, when the last lesson of the course completes.
    fn on_course_completed(&self, course_id: &CourseId);
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, course_id: &CourseId, percentage: u8, completed_units: usize) {
        tracing::info!(%course_id, percentage, completed_units, "course progress");
    }

    fn on_course_completed(&self, course_id: &CourseId) {
        tracing::info!(%course_id, "course completed");
    }
}
