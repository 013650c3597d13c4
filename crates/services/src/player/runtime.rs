//! Event loop driving a [`PlayerSession`] on tokio.
//!
//! Three sources arrive unordered: runtime messages (as commands), the
//! debounce poll, and completed remote calls. Remote calls run on a
//! `JoinSet` so new messages keep flowing while a sync is in flight; their
//! results go back through `apply_report`, which discards anything that no
//! longer describes the active attempt.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::dispatcher::{SyncOutcome, execute};
use crate::error::SyncError;
use crate::listener::Inbound;
use crate::player::{MessageOutcome, PlayerSession};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Message(Inbound),
    /// Learner left the player; flush and stop.
    Leave,
    /// Page is going away; beacon and stop.
    Unload,
}

type Report = Result<SyncOutcome, SyncError>;

/// Runs `session` until `Leave`, `Unload` or the command channel closes.
///
/// A closed channel is treated as an unload. Returns the session for
/// inspection.
pub async fn run_player(
    mut session: PlayerSession,
    mut commands: mpsc::Receiver<PlayerCommand>,
    poll: Duration,
) -> PlayerSession {
    let mut interval = tokio::time::interval(poll);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: JoinSet<Report> = JoinSet::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(PlayerCommand::Message(inbound)) => {
                    match session.handle(inbound).await {
                        Ok(MessageOutcome::CourseCompleted) => {
                            tracing::info!(course_id = %session.course_id(), "player reached completion screen");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "player message failed"),
                    }
                }
                Some(PlayerCommand::Leave) => {
                    drain(&mut session, &mut in_flight).await;
                    session.leave().await;
                    break;
                }
                Some(PlayerCommand::Unload) | None => {
                    let beacon_sent = session.unload();
                    tracing::info!(course_id = %session.course_id(), beacon_sent, "player unloaded");
                    break;
                }
            },
            _ = interval.tick() => {
                for job in session.take_due() {
                    let backend = session.backend();
                    in_flight.spawn(async move { execute(backend.as_ref(), job).await });
                }
            },
            Some(joined) = in_flight.join_next() => {
                apply_joined(&mut session, joined).await;
            }
        }
    }

    session
}

/// Spawns [`run_player`] and returns its command sender.
#[must_use]
pub fn spawn_player(
    session: PlayerSession,
    poll: Duration,
) -> (mpsc::Sender<PlayerCommand>, JoinHandle<PlayerSession>) {
    let (tx, rx) = mpsc::channel(64);
    let task = tokio::spawn(run_player(session, rx, poll));
    (tx, task)
}

async fn drain(session: &mut PlayerSession, in_flight: &mut JoinSet<Report>) {
    while let Some(joined) = in_flight.join_next().await {
        apply_joined(session, joined).await;
    }
}

async fn apply_joined(
    session: &mut PlayerSession,
    joined: Result<Report, tokio::task::JoinError>,
) {
    match joined {
        Ok(report) => {
            if let Err(err) = session.apply_report(report).await {
                tracing::warn!(error = %err, "sync report could not be applied");
            }
        }
        Err(err) => tracing::warn!(error = %err, "sync task did not finish"),
    }
}
