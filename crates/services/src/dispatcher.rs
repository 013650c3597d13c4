//! Two debounced remote channels per active attempt.
//!
//! The persistence channel writes `{completionPercentage, status}` to the
//! attempt record after a short delay; the confirmation channel asks the
//! backend to re-pull authoritative progress after a longer one. Each channel
//! is a [`CoalescingSlot`], so bursts of progress collapse into one call.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use portal_core::coalesce::{CoalescingSlot, PendingSyncJob};
use portal_core::model::AttemptTag;
use portal_core::reconcile::ConfirmedProgress;

use crate::backend::{AttemptBackend, AttemptPatch};
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncChannel {
    Persist,
    Confirm,
}

impl fmt::Display for SyncChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Persist => "persist",
            Self::Confirm => "confirm",
        })
    }
}

/// A remote call ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncJob {
    Persist { target: AttemptTag, patch: AttemptPatch },
    Confirm { target: AttemptTag },
}

impl SyncJob {
    #[must_use]
    pub fn target(&self) -> &AttemptTag {
        match self {
            Self::Persist { target, .. } | Self::Confirm { target } => target,
        }
    }

    #[must_use]
    pub fn channel(&self) -> SyncChannel {
        match self {
            Self::Persist { .. } => SyncChannel::Persist,
            Self::Confirm { .. } => SyncChannel::Confirm,
        }
    }

    fn from_persist(job: PendingSyncJob) -> Self {
        Self::Persist {
            patch: AttemptPatch::from_percentage(job.percentage),
            target: job.target,
        }
    }
}

/// Successful result of a [`SyncJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Persisted { target: AttemptTag },
    Confirmed {
        target: AttemptTag,
        progress: ConfirmedProgress,
    },
}

#[derive(Debug, Clone)]
pub struct SyncDispatcher {
    persist: CoalescingSlot,
    confirm: CoalescingSlot,
}

impl SyncDispatcher {
    #[must_use]
    pub fn new(persist_delay: Duration, confirm_delay: Duration) -> Self {
        Self {
            persist: CoalescingSlot::new(persist_delay),
            confirm: CoalescingSlot::new(confirm_delay),
        }
    }

    /// (Re)arms both channels for `target` with the latest percentage.
    pub fn schedule(&mut self, target: &AttemptTag, percentage: u8, now: DateTime<Utc>) {
        self.persist.schedule(target.clone(), percentage, now);
        self.confirm.schedule(target.clone(), percentage, now);
    }

    /// Drops every pending job. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        usize::from(self.persist.cancel().is_some()) + usize::from(self.confirm.cancel().is_some())
    }

    /// Drops pending jobs owned by `target`. Returns how many were cancelled.
    pub fn cancel_for(&mut self, target: &AttemptTag) -> usize {
        usize::from(self.persist.cancel_for(target).is_some())
            + usize::from(self.confirm.cancel_for(target).is_some())
    }

    /// Repoints pending jobs after the backend rotated the attempt id.
    pub fn retarget(&mut self, old: &AttemptTag, new: &AttemptTag) {
        self.persist.retarget(old, new);
        self.confirm.retarget(old, new);
    }

    /// Takes every job whose deadline has passed, persistence first.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<SyncJob> {
        let mut jobs = Vec::new();
        if let Some(job) = self.persist.take_due(now) {
            jobs.push(SyncJob::from_persist(job));
        }
        if let Some(job) = self.confirm.take_due(now) {
            jobs.push(SyncJob::Confirm { target: job.target });
        }
        jobs
    }

    /// Replaces whatever is pending for `target` with an immediate flush.
    ///
    /// The persistence write is skipped when nothing has been recorded; the
    /// confirmation always runs.
    pub fn flush(&mut self, target: &AttemptTag, percentage: u8) -> Vec<SyncJob> {
        self.cancel_for(target);
        let mut jobs = Vec::with_capacity(2);
        if percentage > 0 {
            jobs.push(SyncJob::Persist {
                target: target.clone(),
                patch: AttemptPatch::from_percentage(percentage),
            });
        }
        jobs.push(SyncJob::Confirm {
            target: target.clone(),
        });
        jobs
    }

    #[must_use]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        match (self.persist.next_due(), self.confirm.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.persist.pending().is_none() && self.confirm.pending().is_none()
    }
}

/// Runs one job against the backend.
///
/// # Errors
///
/// Returns `SyncError::SyncFailed` tagged with the job's channel.
pub async fn execute(backend: &dyn AttemptBackend, job: SyncJob) -> Result<SyncOutcome, SyncError> {
    let channel = job.channel();
    match job {
        SyncJob::Persist { target, patch } => {
            backend
                .update_attempt(&target.attempt_id, &patch)
                .await
                .map_err(|source| SyncError::SyncFailed {
                    channel,
                    attempt_id: target.attempt_id.clone(),
                    source,
                })?;
            Ok(SyncOutcome::Persisted { target })
        }
        SyncJob::Confirm { target } => {
            let synced = backend
                .sync_progress(&target.attempt_id)
                .await
                .map_err(|source| SyncError::SyncFailed {
                    channel,
                    attempt_id: target.attempt_id.clone(),
                    source,
                })?;
            let progress = synced.confirmed(&target.attempt_id);
            Ok(SyncOutcome::Confirmed { target, progress })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::model::AttemptId;
    use portal_core::time::fixed_now;

    fn tag(epoch: u64, id: &str) -> AttemptTag {
        AttemptTag {
            epoch,
            attempt_id: AttemptId::new(id),
        }
    }

    fn dispatcher() -> SyncDispatcher {
        SyncDispatcher::new(Duration::seconds(1), Duration::seconds(5))
    }

    #[test]
    fn burst_collapses_into_one_write_per_channel() {
        let t0 = fixed_now();
        let mut sync = dispatcher();
        let a = tag(1, "A");

        sync.schedule(&a, 10, t0);
        sync.schedule(&a, 40, t0 + Duration::milliseconds(500));

        assert!(sync.due(t0 + Duration::seconds(1)).is_empty());
        let jobs = sync.due(t0 + Duration::milliseconds(1500));
        assert_eq!(
            jobs,
            vec![SyncJob::Persist {
                target: a.clone(),
                patch: AttemptPatch::from_percentage(40),
            }]
        );

        let jobs = sync.due(t0 + Duration::milliseconds(5500));
        assert_eq!(jobs, vec![SyncJob::Confirm { target: a }]);
        assert!(sync.is_idle());
    }

    #[test]
    fn channels_fire_independently() {
        let t0 = fixed_now();
        let mut sync = dispatcher();
        sync.schedule(&tag(1, "A"), 20, t0);
        assert_eq!(sync.next_due(), Some(t0 + Duration::seconds(1)));
        assert_eq!(sync.due(t0 + Duration::seconds(2)).len(), 1);
        assert_eq!(sync.next_due(), Some(t0 + Duration::seconds(5)));
    }

    #[test]
    fn cancel_for_other_attempt_keeps_jobs() {
        let mut sync = dispatcher();
        sync.schedule(&tag(1, "A"), 20, fixed_now());
        assert_eq!(sync.cancel_for(&tag(2, "B")), 0);
        assert_eq!(sync.cancel_for(&tag(1, "A")), 2);
        assert!(sync.is_idle());
    }

    #[test]
    fn flush_skips_empty_persist_but_always_confirms() {
        let mut sync = dispatcher();
        let a = tag(1, "A");
        sync.schedule(&a, 30, fixed_now());

        let jobs = sync.flush(&a, 0);
        assert_eq!(jobs, vec![SyncJob::Confirm { target: a.clone() }]);
        assert!(sync.is_idle());

        let jobs = sync.flush(&a, 100);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].channel(), SyncChannel::Persist);
    }

    #[test]
    fn retarget_follows_rotation() {
        let t0 = fixed_now();
        let mut sync = dispatcher();
        sync.schedule(&tag(1, "A"), 50, t0);
        sync.retarget(&tag(1, "A"), &tag(1, "A2"));
        let jobs = sync.due(t0 + Duration::seconds(6));
        assert!(jobs.iter().all(|job| job.target() == &tag(1, "A2")));
        assert_eq!(jobs.len(), 2);
    }
}
