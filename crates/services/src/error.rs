//! Shared error types for the services crate.

use thiserror::Error;

use portal_core::model::{AttemptId, OutlineError, PackageId};
use portal_core::reconcile::{ForeignHandle, StaleAttemptResponse};
use storage::repository::StorageError;

use crate::dispatcher::SyncChannel;

/// Errors emitted by `AttemptBackend` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("backend request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("backend is unreachable: {0}")]
    Unreachable(String),
}

/// Failures of attempt launch and progress synchronization.
///
/// Only `LaunchUnavailable` is meant for the learner; the rest are recovered
/// locally and logged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("launch unavailable for package {package_id}: {reason}")]
    LaunchUnavailable { package_id: PackageId, reason: String },
    #[error("{channel} sync for attempt {attempt_id} failed: {source}")]
    SyncFailed {
        channel: SyncChannel,
        attempt_id: AttemptId,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    StaleAttemptResponse(#[from] StaleAttemptResponse),
}

/// Errors emitted while opening or driving a player session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayerError {
    #[error(transparent)]
    Outline(#[from] OutlineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    ForeignHandle(#[from] ForeignHandle),
}
