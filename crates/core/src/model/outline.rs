use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, ModuleId, PackageId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutlineError {
    #[error("course has no modules")]
    NoModules,

    #[error("module {module} has no lessons")]
    EmptyModule { module: usize },

    #[error("lesson {position} has no content package")]
    MissingPackage { position: LessonPosition },

    #[error("outline document is invalid: {0}")]
    Document(String),
}

//
// ─── POSITION ──────────────────────────────────────────────────────────────────
//

/// Zero-based (module, lesson) coordinates inside a course outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LessonPosition {
    pub module: usize,
    pub lesson: usize,
}

impl LessonPosition {
    #[must_use]
    pub fn new(module: usize, lesson: usize) -> Self {
        Self { module, lesson }
    }
}

impl fmt::Display for LessonPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.module, self.lesson)
    }
}

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

/// A lesson maps 1:1 to a SCORM content package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    title: String,
    package_id: PackageId,
}

impl Lesson {
    #[must_use]
    pub fn new(id: LessonId, title: impl Into<String>, package_id: PackageId) -> Self {
        Self {
            id,
            title: title.into(),
            package_id,
        }
    }

    #[must_use]
    pub fn id(&self) -> &LessonId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn package_id(&self) -> &PackageId {
        &self.package_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    id: ModuleId,
    title: String,
    lessons: Vec<Lesson>,
}

impl Module {
    #[must_use]
    pub fn new(id: ModuleId, title: impl Into<String>, lessons: Vec<Lesson>) -> Self {
        Self {
            id,
            title: title.into(),
            lessons,
        }
    }

    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }
}

/// Ordered modules of ordered lessons for one course.
///
/// Construction guarantees at least one module, no empty modules and a
/// package id on every lesson, so navigation never has to handle holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutline {
    course_id: CourseId,
    title: String,
    modules: Vec<Module>,
}

impl CourseOutline {
    /// # Errors
    ///
    /// Returns `OutlineError` if the outline is empty, a module has no
    /// lessons, or a lesson has a blank package id.
    pub fn new(
        course_id: CourseId,
        title: impl Into<String>,
        modules: Vec<Module>,
    ) -> Result<Self, OutlineError> {
        if modules.is_empty() {
            return Err(OutlineError::NoModules);
        }
        for (m, module) in modules.iter().enumerate() {
            if module.lessons.is_empty() {
                return Err(OutlineError::EmptyModule { module: m });
            }
            for (l, lesson) in module.lessons.iter().enumerate() {
                if lesson.package_id.is_blank() {
                    return Err(OutlineError::MissingPackage {
                        position: LessonPosition::new(m, l),
                    });
                }
            }
        }
        Ok(Self {
            course_id,
            title: title.into(),
            modules,
        })
    }

    /// Parses a backend course document.
    ///
    /// Accepts the misspelled `scormPackegeId` key some backend payloads use
    /// and `name` as a module title.
    ///
    /// # Errors
    ///
    /// Returns `OutlineError::Document` for malformed JSON, or any structural
    /// error from [`CourseOutline::new`].
    pub fn from_json(raw: &str) -> Result<Self, OutlineError> {
        let doc: CourseDocument =
            serde_json::from_str(raw).map_err(|e| OutlineError::Document(e.to_string()))?;
        doc.into_outline()
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn lesson(&self, at: LessonPosition) -> Option<&Lesson> {
        self.modules.get(at.module)?.lessons.get(at.lesson)
    }

    #[must_use]
    pub fn total_lessons(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }

    /// Position following `at` in outline order, crossing module boundaries.
    #[must_use]
    pub fn next_position(&self, at: LessonPosition) -> Option<LessonPosition> {
        let module = self.modules.get(at.module)?;
        if at.lesson + 1 < module.lessons.len() {
            return Some(LessonPosition::new(at.module, at.lesson + 1));
        }
        if at.module + 1 < self.modules.len() {
            return Some(LessonPosition::new(at.module + 1, 0));
        }
        None
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseDocument {
    id: CourseId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    modules: Vec<ModuleDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleDocument {
    id: ModuleId,
    #[serde(default, alias = "name")]
    title: String,
    #[serde(default)]
    lessons: Vec<LessonDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LessonDocument {
    id: LessonId,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "scormPackegeId")]
    scorm_package_id: Option<PackageId>,
}

impl CourseDocument {
    fn into_outline(self) -> Result<CourseOutline, OutlineError> {
        let mut modules = Vec::with_capacity(self.modules.len());
        for (m, module) in self.modules.into_iter().enumerate() {
            let mut lessons = Vec::with_capacity(module.lessons.len());
            for (l, lesson) in module.lessons.into_iter().enumerate() {
                let package_id = lesson.scorm_package_id.ok_or(OutlineError::MissingPackage {
                    position: LessonPosition::new(m, l),
                })?;
                lessons.push(Lesson::new(lesson.id, lesson.title, package_id));
            }
            modules.push(Module::new(module.id, module.title, lessons));
        }
        CourseOutline::new(self.id, self.title, modules)
    }
}

//
// ─── NAVIGATION ────────────────────────────────────────────────────────────────
//

/// Result of moving past the current lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved(LessonPosition),
    CourseFinished,
}

/// Where the learner currently is in a course outline.
///
/// Lives only for the duration of a player session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    course_id: CourseId,
    position: LessonPosition,
    completed: BTreeSet<LessonPosition>,
}

impl NavigationState {
    /// Navigation at the first lesson of `outline`.
    #[must_use]
    pub fn start(outline: &CourseOutline) -> Self {
        Self {
            course_id: outline.course_id().clone(),
            position: LessonPosition::default(),
            completed: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn position(&self) -> LessonPosition {
        self.position
    }

    #[must_use]
    pub fn is_completed(&self, at: LessonPosition) -> bool {
        self.completed.contains(&at)
    }

    #[must_use]
    pub fn current_completed(&self) -> bool {
        self.is_completed(self.position)
    }

    #[must_use]
    pub fn completed_lessons(&self) -> usize {
        self.completed.len()
    }

    /// Modules whose lessons are all complete.
    #[must_use]
    pub fn completed_modules(&self, outline: &CourseOutline) -> usize {
        outline
            .modules()
            .iter()
            .enumerate()
            .filter(|(m, module)| {
                (0..module.lessons().len())
                    .all(|l| self.completed.contains(&LessonPosition::new(*m, l)))
            })
            .count()
    }

    pub fn mark_current_complete(&mut self) -> bool {
        self.completed.insert(self.position)
    }

    /// Moves to the next lesson. Only valid once the current lesson is complete;
    /// returns `None` otherwise and leaves the position untouched.
    pub fn advance(&mut self, outline: &CourseOutline) -> Option<Advance> {
        if !self.current_completed() {
            return None;
        }
        match outline.next_position(self.position) {
            Some(next) => {
                self.position = next;
                Some(Advance::Moved(next))
            }
            None => Some(Advance::CourseFinished),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> CourseOutline {
        let lesson = |id: &str| Lesson::new(LessonId::new(id), id, PackageId::new(format!("pkg-{id}")));
        CourseOutline::new(
            CourseId::new("course-1"),
            "Safety",
            vec![
                Module::new(ModuleId::new("m0"), "Intro", vec![lesson("l00"), lesson("l01")]),
                Module::new(ModuleId::new("m1"), "Field", vec![lesson("l10"), lesson("l11")]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn next_position_crosses_modules() {
        let outline = two_by_two();
        assert_eq!(
            outline.next_position(LessonPosition::new(0, 0)),
            Some(LessonPosition::new(0, 1))
        );
        assert_eq!(
            outline.next_position(LessonPosition::new(0, 1)),
            Some(LessonPosition::new(1, 0))
        );
        assert_eq!(outline.next_position(LessonPosition::new(1, 1)), None);
        assert_eq!(outline.next_position(LessonPosition::new(5, 0)), None);
    }

    #[test]
    fn advance_requires_current_completion() {
        let outline = two_by_two();
        let mut nav = NavigationState::start(&outline);
        assert_eq!(nav.advance(&outline), None);
        assert_eq!(nav.position(), LessonPosition::new(0, 0));

        nav.mark_current_complete();
        assert_eq!(
            nav.advance(&outline),
            Some(Advance::Moved(LessonPosition::new(0, 1)))
        );
        assert_eq!(nav.completed_lessons(), 1);
        assert_eq!(nav.completed_modules(&outline), 0);
    }

    #[test]
    fn last_lesson_finishes_course() {
        let outline = two_by_two();
        let mut nav = NavigationState::start(&outline);
        for _ in 0..3 {
            nav.mark_current_complete();
            assert!(matches!(nav.advance(&outline), Some(Advance::Moved(_))));
        }
        nav.mark_current_complete();
        assert_eq!(nav.advance(&outline), Some(Advance::CourseFinished));
        assert_eq!(nav.completed_modules(&outline), 2);
    }

    #[test]
    fn rejects_structural_holes() {
        assert_eq!(
            CourseOutline::new(CourseId::new("c"), "t", vec![]),
            Err(OutlineError::NoModules)
        );
        let empty = Module::new(ModuleId::new("m"), "m", vec![]);
        assert_eq!(
            CourseOutline::new(CourseId::new("c"), "t", vec![empty]),
            Err(OutlineError::EmptyModule { module: 0 })
        );
    }

    #[test]
    fn parses_backend_document_with_misspelled_package_key() {
        let raw = r#"{
            "id": "course-9",
            "title": "Forklift",
            "modules": [
                { "id": "m0", "name": "Basics", "lessons": [
                    { "id": "l0", "title": "One", "scormPackageId": "pkg-a" },
                    { "id": "l1", "title": "Two", "scormPackegeId": "pkg-b" }
                ]}
            ]
        }"#;
        let outline = CourseOutline::from_json(raw).unwrap();
        assert_eq!(outline.modules()[0].title(), "Basics");
        assert_eq!(
            outline.lesson(LessonPosition::new(0, 1)).unwrap().package_id(),
            &PackageId::new("pkg-b")
        );
        assert_eq!(outline.total_lessons(), 2);
    }

    #[test]
    fn document_lesson_without_package_is_rejected() {
        let raw = r#"{"id":"c","modules":[{"id":"m","lessons":[{"id":"l"}]}]}"#;
        assert_eq!(
            CourseOutline::from_json(raw),
            Err(OutlineError::MissingPackage {
                position: LessonPosition::new(0, 0)
            })
        );
    }
}
