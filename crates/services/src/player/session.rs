//! One learner's pass through a course in the embedded player.
//!
//! `PlayerSession` wires the pure [`Reconciler`] to its effects: the
//! resolver for launches, the dispatcher for debounced remote writes, the
//! course cache and observer for immediate local updates, and the durability
//! guard for unload.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use portal_core::Clock;
use portal_core::model::{
    AttemptHandle, AttemptTag, CourseId, CourseOutline, CourseRecord, LessonPosition,
    ProgressSignal,
};
use portal_core::reconcile::{
    IgnoreReason, LessonOutcome, ProgressUpdate, Reconciled, Reconciler, Transition,
};
use storage::repository::{CourseCacheRepository, StorageError};
use url::Url;

use crate::backend::AttemptBackend;
use crate::config::SyncConfig;
use crate::dispatcher::{SyncDispatcher, SyncJob, SyncOutcome, execute};
use crate::durability::{BeaconTransport, DurabilityGuard};
use crate::error::{PlayerError, SyncError};
use crate::listener::{Dropped, Inbound, ListenerSignal, ProgressListener};
use crate::player::ProgressObserver;
use crate::resolver::AttemptResolver;

/// Collaborators a session needs.
#[derive(Clone)]
pub struct PlayerServices {
    pub config: SyncConfig,
    pub clock: Clock,
    pub backend: Arc<dyn AttemptBackend>,
    pub beacon: Arc<dyn BeaconTransport>,
    pub courses: Arc<dyn CourseCacheRepository>,
    pub observer: Arc<dyn ProgressObserver>,
}

/// What handling one inbound message amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Dropped(Dropped),
    Ignored(IgnoreReason),
    Progressed { percentage: u8 },
    LessonAdvanced(LessonPosition),
    CourseCompleted,
    SessionClosed,
}

/// What the player should show for the current lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonState {
    /// Load `launch_address` into the frame and stamp every message it
    /// posts with `epoch`.
    Ready {
        lesson: LessonPosition,
        epoch: u64,
        launch_address: Url,
    },
    /// The launch failed; blocking for this lesson until `relaunch`.
    Unavailable {
        lesson: LessonPosition,
        reason: String,
    },
    /// The runtime session ended before the lesson completed.
    Closed { lesson: LessonPosition },
    CourseComplete,
}

pub struct PlayerSession {
    clock: Clock,
    engine: Reconciler,
    resolver: AttemptResolver,
    listener: ProgressListener,
    dispatcher: SyncDispatcher,
    guard: DurabilityGuard,
    backend: Arc<dyn AttemptBackend>,
    courses: Arc<dyn CourseCacheRepository>,
    observer: Arc<dyn ProgressObserver>,
    launch_error: Option<SyncError>,
}

impl PlayerSession {
    /// Opens `outline` at its first lesson and launches it.
    ///
    /// A failed launch is not an error here; it shows up as
    /// [`LessonState::Unavailable`].
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if the course cache cannot be seeded.
    pub async fn open(services: PlayerServices, outline: CourseOutline) -> Result<Self, PlayerError> {
        let PlayerServices {
            config,
            clock,
            backend,
            beacon,
            courses,
            observer,
        } = services;

        let mut session = Self {
            clock,
            engine: Reconciler::new(outline),
            resolver: AttemptResolver::new(Arc::clone(&backend)),
            listener: ProgressListener::new(config.scorm_origin),
            dispatcher: SyncDispatcher::new(config.persist_delay, config.confirm_delay),
            guard: DurabilityGuard::new(beacon),
            backend,
            courses,
            observer,
            launch_error: None,
        };
        session.seed_cache().await?;
        session.launch_current().await?;
        Ok(session)
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        self.engine.outline().course_id()
    }

    #[must_use]
    pub fn position(&self) -> LessonPosition {
        self.engine.navigation().position()
    }

    #[must_use]
    pub fn signal(&self) -> ProgressSignal {
        self.engine.signal()
    }

    #[must_use]
    pub fn active_handle(&self) -> Option<&AttemptHandle> {
        self.engine.handle()
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn AttemptBackend> {
        Arc::clone(&self.backend)
    }

    #[must_use]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.dispatcher.next_due()
    }

    #[must_use]
    pub fn has_pending_sync(&self) -> bool {
        !self.dispatcher.is_idle()
    }

    /// True only after the course-completion signal fired.
    #[must_use]
    pub fn is_course_complete(&self) -> bool {
        self.engine.is_course_finished()
    }

    #[must_use]
    pub fn lesson_state(&self) -> LessonState {
        if self.engine.is_course_finished() {
            return LessonState::CourseComplete;
        }
        let lesson = self.position();
        if let Some(handle) = self.engine.handle() {
            return LessonState::Ready {
                lesson,
                epoch: handle.epoch(),
                launch_address: handle.launch_address().clone(),
            };
        }
        match &self.launch_error {
            Some(err) => LessonState::Unavailable {
                lesson,
                reason: err.to_string(),
            },
            None => LessonState::Closed { lesson },
        }
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    //
    // ─── INBOUND ───────────────────────────────────────────────────────────────
    //

    /// Handles one message from the runtime (or the in-process end signal).
    ///
    /// Nothing about a bad or irrelevant message is an error; it is logged
    /// and reported as `Dropped`/`Ignored`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` only if launching the next lesson breaks an
    /// internal invariant.
    pub async fn handle(&mut self, inbound: Inbound) -> Result<MessageOutcome, PlayerError> {
        let active = self.engine.active_tag();
        let signal = match self.listener.accept(inbound, active.as_ref()) {
            Ok(signal) => signal,
            Err(reason) => {
                tracing::debug!(%reason, "runtime message dropped");
                return Ok(MessageOutcome::Dropped(reason));
            }
        };
        match signal {
            ListenerSignal::Progress(update) => self.apply_progress(update).await,
            ListenerSignal::SessionEnded => self.session_ended().await,
        }
    }

    async fn apply_progress(&mut self, update: ProgressUpdate) -> Result<MessageOutcome, PlayerError> {
        let transition = match self.engine.apply(update) {
            Reconciled::Applied(transition) => transition,
            Reconciled::Ignored(reason) => {
                tracing::debug!(?reason, percentage = update.percentage, "progress ignored");
                return Ok(MessageOutcome::Ignored(reason));
            }
        };

        self.publish(&transition).await;
        if transition.signal.completed() {
            return self.complete_lesson(&transition.tag).await;
        }
        let percentage = transition.signal.percentage();
        self.dispatcher
            .schedule(&transition.tag, percentage, self.clock.now());
        Ok(MessageOutcome::Progressed { percentage })
    }

    /// Flushes the current attempt and closes its runtime session.
    ///
    /// Navigation moves on only after the flush resolved or failed, and only
    /// if the lesson is complete; otherwise the lesson stays put with no
    /// active attempt until [`relaunch`](Self::relaunch).
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` only if launching the next lesson breaks an
    /// internal invariant.
    pub async fn session_ended(&mut self) -> Result<MessageOutcome, PlayerError> {
        let Some(tag) = self.engine.active_tag() else {
            return Ok(MessageOutcome::SessionClosed);
        };
        self.flush(&tag).await;
        if self.engine.signal().completed() {
            return self.advance().await;
        }
        self.drop_handle();
        tracing::info!(lesson = %self.position(), "runtime session ended before completion");
        Ok(MessageOutcome::SessionClosed)
    }

    /// Learner navigates away from the player: same awaited flush as a
    /// session end, without launching anything new.
    pub async fn leave(&mut self) {
        if let Some(tag) = self.engine.active_tag() {
            self.flush(&tag).await;
        }
        self.drop_handle();
    }

    /// Page is going away: hand the current progress to the beacon and
    /// forget the attempt. Returns whether a write was issued.
    pub fn unload(&mut self) -> bool {
        let sent = self.guard.on_unload(self.engine.handle(), self.engine.signal());
        self.drop_handle();
        sent
    }

    /// Requests a fresh attempt for the current lesson.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if the launched handle does not fit the lesson.
    pub async fn relaunch(&mut self) -> Result<(), PlayerError> {
        if self.engine.is_course_finished() {
            return Ok(());
        }
        self.launch_current().await
    }

    //
    // ─── TIMERS ────────────────────────────────────────────────────────────────
    //

    /// Removes jobs that are due on the session clock.
    pub fn take_due(&mut self) -> Vec<SyncJob> {
        self.dispatcher.due(self.clock.now())
    }

    /// Runs due jobs inline, in order. Returns how many ran.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` only if launching the next lesson breaks an
    /// internal invariant.
    pub async fn tick(&mut self) -> Result<usize, PlayerError> {
        let jobs = self.take_due();
        let count = jobs.len();
        for job in jobs {
            let report = execute(self.backend.as_ref(), job).await;
            self.apply_report(report).await?;
        }
        Ok(count)
    }

    /// Applies the result of a remote call issued earlier.
    ///
    /// Responses for attempts that are no longer active are discarded
    /// without touching any state.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` only if launching the next lesson breaks an
    /// internal invariant.
    pub async fn apply_report(
        &mut self,
        report: Result<SyncOutcome, SyncError>,
    ) -> Result<Option<MessageOutcome>, PlayerError> {
        match self.settle(report).await {
            Some(transition) if transition.signal.completed() => {
                self.complete_lesson(&transition.tag).await.map(Some)
            }
            Some(transition) => Ok(Some(MessageOutcome::Progressed {
                percentage: transition.signal.percentage(),
            })),
            None => Ok(None),
        }
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    async fn settle(&mut self, report: Result<SyncOutcome, SyncError>) -> Option<Transition> {
        let (target, progress) = match report {
            Ok(SyncOutcome::Persisted { target }) => {
                tracing::debug!(attempt_id = %target.attempt_id, "attempt record updated");
                return None;
            }
            Ok(SyncOutcome::Confirmed { target, progress }) => (target, progress),
            Err(err) => {
                tracing::warn!(error = %err, "progress sync failed");
                return None;
            }
        };

        let confirmation = match self.engine.apply_confirmation(&target, progress) {
            Ok(confirmation) => confirmation,
            Err(stale) => {
                tracing::debug!(error = %SyncError::from(stale), "stale sync response discarded");
                return None;
            }
        };
        if let Some((previous, adopted)) = &confirmation.rotated {
            tracing::info!(
                previous = %previous.attempt_id,
                adopted = %adopted.attempt_id,
                "backend rotated attempt"
            );
            self.dispatcher.retarget(previous, adopted);
        }
        let transition = confirmation.transition?;
        self.publish(&transition).await;
        Some(transition)
    }

    async fn complete_lesson(&mut self, tag: &AttemptTag) -> Result<MessageOutcome, PlayerError> {
        self.flush(tag).await;
        self.advance().await
    }

    /// Awaited persist-then-confirm for `tag`. Failures are logged only.
    async fn flush(&mut self, tag: &AttemptTag) {
        let percentage = self.engine.signal().percentage();
        for job in self.dispatcher.flush(tag, percentage) {
            let report = execute(self.backend.as_ref(), job).await;
            self.settle(report).await;
        }
    }

    async fn advance(&mut self) -> Result<MessageOutcome, PlayerError> {
        self.dispatcher.cancel_all();
        match self.engine.finish_lesson() {
            LessonOutcome::Advanced(next) => {
                tracing::info!(course_id = %self.course_id(), lesson = %next, "advanced to next lesson");
                self.refresh_course_cache().await;
                self.launch_current().await?;
                Ok(MessageOutcome::LessonAdvanced(next))
            }
            LessonOutcome::CourseCompleted => {
                tracing::info!(course_id = %self.course_id(), "course outline fully traversed");
                self.refresh_course_cache().await;
                self.observer.on_course_completed(self.engine.outline().course_id());
                Ok(MessageOutcome::CourseCompleted)
            }
            LessonOutcome::AlreadyFinished => Ok(MessageOutcome::Ignored(IgnoreReason::CourseFinished)),
            LessonOutcome::NotComplete => Ok(MessageOutcome::SessionClosed),
        }
    }

    /// Discards the active handle and anything scheduled for it.
    fn drop_handle(&mut self) {
        let cancelled = self.dispatcher.cancel_all();
        if let Some(old) = self.engine.discard_handle() {
            tracing::debug!(attempt_id = %old.attempt_id(), cancelled, "attempt discarded");
        }
    }

    async fn launch_current(&mut self) -> Result<(), PlayerError> {
        self.drop_handle();
        self.launch_error = None;

        let lesson = self.position();
        let Some(package_id) = self
            .engine
            .current_lesson()
            .map(|lesson| lesson.package_id().clone())
        else {
            return Ok(());
        };

        match self.resolver.resolve(lesson, &package_id).await {
            Ok(handle) => {
                self.engine.install_handle(handle)?;
            }
            Err(err) => {
                tracing::warn!(%lesson, error = %err, "lesson launch unavailable");
                self.launch_error = Some(err);
            }
        }
        Ok(())
    }

    async fn publish(&self, transition: &Transition) {
        self.observer.on_progress(
            &transition.course_id,
            transition.course_percentage,
            transition.completed_lessons,
        );
        self.write_course_cache(transition.course_percentage, transition.completed_modules)
            .await;
    }

    async fn refresh_course_cache(&self) {
        let progress = self.engine.course_progress();
        self.write_course_cache(progress.percentage, progress.completed_modules)
            .await;
    }

    async fn write_course_cache(&self, percentage: u8, completed_modules: usize) {
        if let Err(err) = self.replace_course_record(percentage, completed_modules).await {
            tracing::warn!(course_id = %self.course_id(), error = %err, "course cache write failed");
        }
    }

    async fn replace_course_record(
        &self,
        percentage: u8,
        completed_modules: usize,
    ) -> Result<(), StorageError> {
        let outline = self.engine.outline();
        let current = match self.courses.get_course(outline.course_id()).await? {
            Some(record) => record,
            None => CourseRecord::from_outline(outline),
        };
        let completed_modules = u32::try_from(completed_modules).unwrap_or(u32::MAX);
        let next = current.with_progress(percentage, completed_modules);
        if next != current {
            self.courses.replace_course(&next).await?;
        }
        Ok(())
    }

    async fn seed_cache(&self) -> Result<(), StorageError> {
        let outline = self.engine.outline();
        if self.courses.get_course(outline.course_id()).await?.is_none() {
            self.courses
                .replace_course(&CourseRecord::from_outline(outline))
                .await?;
        }
        Ok(())
    }
}
