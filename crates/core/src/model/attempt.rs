use url::Url;

use crate::model::ids::{AttemptId, PackageId};
use crate::model::outline::LessonPosition;

/// Identity of the handle a remote call or runtime frame was issued under.
///
/// `epoch` is unique per launch within a player slot, so two handles that
/// happen to share a package (or even an attempt id) never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptTag {
    pub epoch: u64,
    pub attempt_id: AttemptId,
}

/// One launch of one content package for one lesson.
///
/// Owned by the reconciler for the active lesson; discarded (never reused)
/// on lesson change, session end or unload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptHandle {
    epoch: u64,
    lesson: LessonPosition,
    package_id: PackageId,
    attempt_id: AttemptId,
    launch_address: Url,
}

impl AttemptHandle {
    #[must_use]
    pub fn new(
        epoch: u64,
        lesson: LessonPosition,
        package_id: PackageId,
        attempt_id: AttemptId,
        launch_address: Url,
    ) -> Self {
        Self {
            epoch,
            lesson,
            package_id,
            attempt_id,
            launch_address,
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn lesson(&self) -> LessonPosition {
        self.lesson
    }

    #[must_use]
    pub fn package_id(&self) -> &PackageId {
        &self.package_id
    }

    #[must_use]
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    #[must_use]
    pub fn launch_address(&self) -> &Url {
        &self.launch_address
    }

    #[must_use]
    pub fn tag(&self) -> AttemptTag {
        AttemptTag {
            epoch: self.epoch,
            attempt_id: self.attempt_id.clone(),
        }
    }

    /// True if `tag` still describes this handle.
    #[must_use]
    pub fn matches(&self, tag: &AttemptTag) -> bool {
        self.epoch == tag.epoch && self.attempt_id == tag.attempt_id
    }

    /// The backend rotated the attempt; the launch stays the same.
    pub(crate) fn adopt_attempt_id(&mut self, attempt_id: AttemptId) {
        self.attempt_id = attempt_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(epoch: u64, attempt: &str) -> AttemptHandle {
        AttemptHandle::new(
            epoch,
            LessonPosition::new(0, 0),
            PackageId::new("pkg"),
            AttemptId::new(attempt),
            Url::parse("https://cloud.scorm.com/launch/abc").unwrap(),
        )
    }

    #[test]
    fn tag_matches_only_same_epoch_and_attempt() {
        let h = handle(3, "A");
        assert!(h.matches(&h.tag()));
        assert!(!h.matches(&handle(4, "A").tag()));
        assert!(!h.matches(&handle(3, "B").tag()));
    }

    #[test]
    fn adopting_rotated_attempt_changes_tag() {
        let mut h = handle(1, "A");
        let old = h.tag();
        h.adopt_attempt_id(AttemptId::new("B"));
        assert!(!h.matches(&old));
        assert_eq!(h.attempt_id(), &AttemptId::new("B"));
        assert_eq!(h.epoch(), 1);
    }
}
