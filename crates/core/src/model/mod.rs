mod attempt;
mod course;
mod ids;
mod outline;
mod progress;

pub use attempt::{AttemptHandle, AttemptTag};
pub use course::CourseRecord;
pub use ids::{AttemptId, CourseId, LessonId, ModuleId, PackageId, ParseIdError};
pub use outline::{
    Advance, CourseOutline, Lesson, LessonPosition, Module, NavigationState, OutlineError,
};
pub use progress::{
    CompletionStatus, ProgressSignal, percentage_from_backend, percentage_from_fraction,
};
