use std::sync::Arc;

use portal_core::model::{AttemptHandle, AttemptId, LessonPosition, PackageId};
use url::Url;

use crate::backend::AttemptBackend;
use crate::error::SyncError;

/// Obtains a fresh launch handle for a lesson's content package.
///
/// Every call hits the backend; handles are never cached, because each
/// lesson may be a distinct attempt even when packages repeat. Each handle
/// gets a new epoch so it is distinguishable from every earlier one.
pub struct AttemptResolver {
    backend: Arc<dyn AttemptBackend>,
    epoch: u64,
}

impl AttemptResolver {
    #[must_use]
    pub fn new(backend: Arc<dyn AttemptBackend>) -> Self {
        Self { backend, epoch: 0 }
    }

    /// Requests a launch for the lesson at `lesson`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::LaunchUnavailable` if the request fails or the
    /// grant lacks a usable launch URL or attempt id.
    pub async fn resolve(
        &mut self,
        lesson: LessonPosition,
        package_id: &PackageId,
    ) -> Result<AttemptHandle, SyncError> {
        self.epoch += 1;
        let epoch = self.epoch;
        let unavailable = |reason: String| SyncError::LaunchUnavailable {
            package_id: package_id.clone(),
            reason,
        };

        let grant = self
            .backend
            .launch(package_id)
            .await
            .map_err(|err| unavailable(err.to_string()))?;

        let launch_url = grant
            .launch_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| unavailable("response has no launchUrl".into()))?;
        let launch_address =
            Url::parse(launch_url).map_err(|err| unavailable(format!("invalid launchUrl: {err}")))?;
        let attempt_id = grant
            .scorm_attempt_id
            .as_deref()
            .and_then(|raw| raw.parse::<AttemptId>().ok())
            .ok_or_else(|| unavailable("response has no scormAttemptId".into()))?;

        tracing::debug!(%lesson, %package_id, %attempt_id, epoch, "attempt launched");
        Ok(AttemptHandle::new(
            epoch,
            lesson,
            package_id.clone(),
            attempt_id,
            launch_address,
        ))
    }
}
