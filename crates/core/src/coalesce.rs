//! Coalescing job slots for debounced remote writes.
//!
//! A slot holds at most one [`PendingSyncJob`]. Scheduling while a job is
//! pending replaces its payload and pushes its deadline out (trailing-edge
//! debounce); nothing ever queues behind it. Time is always passed in, so
//! slots are driven by tests without real timers.

use chrono::{DateTime, Duration, Utc};

use crate::model::AttemptTag;

/// A scheduled, coalescible remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSyncJob {
    pub target: AttemptTag,
    pub percentage: u8,
    pub due_at: DateTime<Utc>,
}

/// What happened to the slot when something was scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled {
    New,
    Replaced { previous: PendingSyncJob },
}

#[derive(Debug, Clone)]
pub struct CoalescingSlot {
    delay: Duration,
    pending: Option<PendingSyncJob>,
}

impl CoalescingSlot {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingSyncJob> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending.as_ref().map(|job| job.due_at)
    }

    pub fn schedule(&mut self, target: AttemptTag, percentage: u8, now: DateTime<Utc>) -> Scheduled {
        let job = PendingSyncJob {
            target,
            percentage,
            due_at: now + self.delay,
        };
        match self.pending.replace(job) {
            Some(previous) => Scheduled::Replaced { previous },
            None => Scheduled::New,
        }
    }

    pub fn cancel(&mut self) -> Option<PendingSyncJob> {
        self.pending.take()
    }

    /// Cancels the pending job only if it belongs to `target`.
    pub fn cancel_for(&mut self, target: &AttemptTag) -> Option<PendingSyncJob> {
        if self.pending.as_ref().is_some_and(|job| &job.target == target) {
            return self.pending.take();
        }
        None
    }

    /// Points a pending job for `old` at `new` without touching its deadline.
    pub fn retarget(&mut self, old: &AttemptTag, new: &AttemptTag) -> bool {
        match self.pending.as_mut() {
            Some(job) if &job.target == old => {
                job.target = new.clone();
                true
            }
            _ => false,
        }
    }

    /// Removes and returns the pending job if its deadline has passed.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<PendingSyncJob> {
        if self.pending.as_ref().is_some_and(|job| job.due_at <= now) {
            return self.pending.take();
        }
        None
    }
}
