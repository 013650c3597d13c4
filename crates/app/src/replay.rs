//! Replays a recorded runtime session against a course outline.
//!
//! A recording is JSON Lines, one step per line:
//!
//! ```text
//! {"kind":"message","frame":1,"data":{"messageType":"ScoProgress","progress":0.4}}
//! {"kind":"wait","ms":1500}
//! {"kind":"message","frame":1,"data":{"messageType":"CourseCompleted"}}
//! {"kind":"message","frame":1,"data":{"messageType":"PlayerExit"}}
//! {"kind":"message","frame":2,"data":{"messageType":"ScoProgress","progress":0.1}}
//! {"kind":"unload"}
//! ```
//!
//! `frame` is the epoch of the launch the posting document was loaded from:
//! 1 for the first launch of the session, 2 for the next, and so on.
//!
//! [`run_steps`] simulates time: `wait` steps move the session clock and run
//! whatever sync jobs fell due. [`run_live`] feeds the same steps to the
//! player event loop in wall time.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use portal_core::model::{AttemptId, PackageId};
use serde::Deserialize;
use serde_json::Value;
use services::{
    AttemptBackend, AttemptPatch, BackendError, BeaconTransport, Inbound, LaunchGrant,
    MessageOutcome, PlayerCommand, PlayerError, PlayerSession, SyncedAttempt, spawn_player,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReplayStep {
    Message {
        #[serde(default)]
        origin: Option<String>,
        frame: u64,
        data: Value,
    },
    Wait {
        ms: i64,
    },
    SessionEnded,
    Leave,
    Unload,
}

#[derive(Debug)]
pub struct StepError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "events line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for StepError {}

/// Parses a JSON Lines recording. Blank lines and `#` comments are skipped.
///
/// # Errors
///
/// Returns `StepError` naming the first line that is not a valid step.
pub fn parse_steps(raw: &str) -> Result<Vec<ReplayStep>, StepError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| StepError {
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// How the replay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEnd {
    Left,
    /// `beacon_sent` is unknown when the event loop performed the unload;
    /// it logs the result itself.
    Unloaded { beacon_sent: Option<bool> },
}

/// Feeds `steps` to `session`. Stops at the first `leave` or `unload`, and
/// leaves the player if the recording ends without either.
///
/// # Errors
///
/// Returns `PlayerError` if the session breaks an internal invariant.
pub async fn run_steps(
    session: &mut PlayerSession,
    steps: Vec<ReplayStep>,
    default_origin: &str,
) -> Result<ReplayEnd, PlayerError> {
    for step in steps {
        match step {
            ReplayStep::Message {
                origin,
                frame,
                data,
            } => {
                let origin = origin.unwrap_or_else(|| default_origin.to_owned());
                let outcome = session.handle(Inbound::message(origin, data, frame)).await?;
                log_outcome(&outcome);
            }
            ReplayStep::Wait { ms } => {
                session.clock_mut().advance(Duration::milliseconds(ms.max(0)));
                let ran = session.tick().await?;
                tracing::debug!(ms, ran, "clock advanced");
            }
            ReplayStep::SessionEnded => {
                let outcome = session.handle(Inbound::SessionEnded).await?;
                log_outcome(&outcome);
            }
            ReplayStep::Leave => {
                session.leave().await;
                return Ok(ReplayEnd::Left);
            }
            ReplayStep::Unload => {
                let beacon_sent = session.unload();
                return Ok(ReplayEnd::Unloaded {
                    beacon_sent: Some(beacon_sent),
                });
            }
        }
    }
    session.leave().await;
    Ok(ReplayEnd::Left)
}

/// Feeds `steps` to the player event loop, sleeping through `wait` steps.
///
/// The session should run on a system clock so the loop's poll sees jobs
/// fall due. Returns the session once the loop stopped.
///
/// # Errors
///
/// Returns `JoinError` if the event loop task panicked.
pub async fn run_live(
    session: PlayerSession,
    steps: Vec<ReplayStep>,
    default_origin: &str,
    poll: std::time::Duration,
) -> Result<(PlayerSession, ReplayEnd), tokio::task::JoinError> {
    let (commands, task) = spawn_player(session, poll);
    let mut end = ReplayEnd::Left;
    let mut stopped = false;
    for step in steps {
        let command = match step {
            ReplayStep::Message {
                origin,
                frame,
                data,
            } => {
                let origin = origin.unwrap_or_else(|| default_origin.to_owned());
                PlayerCommand::Message(Inbound::message(origin, data, frame))
            }
            ReplayStep::Wait { ms } => {
                let ms = u64::try_from(ms).unwrap_or(0);
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                continue;
            }
            ReplayStep::SessionEnded => PlayerCommand::Message(Inbound::SessionEnded),
            ReplayStep::Leave => PlayerCommand::Leave,
            ReplayStep::Unload => {
                end = ReplayEnd::Unloaded { beacon_sent: None };
                PlayerCommand::Unload
            }
        };
        stopped = matches!(command, PlayerCommand::Leave | PlayerCommand::Unload);
        if commands.send(command).await.is_err() {
            stopped = true;
        }
        if stopped {
            break;
        }
    }
    if !stopped {
        // A closed channel reads as an unload; leave explicitly instead.
        let _ = commands.send(PlayerCommand::Leave).await;
    }
    drop(commands);
    let session = task.await?;
    Ok((session, end))
}

fn log_outcome(outcome: &MessageOutcome) {
    match outcome {
        MessageOutcome::Dropped(reason) => tracing::debug!(%reason, "message dropped"),
        MessageOutcome::Ignored(reason) => tracing::debug!(?reason, "message ignored"),
        MessageOutcome::Progressed { percentage } => tracing::debug!(percentage, "progress"),
        MessageOutcome::LessonAdvanced(next) => tracing::info!(lesson = %next, "lesson advanced"),
        MessageOutcome::CourseCompleted => tracing::info!("course completed"),
        MessageOutcome::SessionClosed => tracing::info!("runtime session closed"),
    }
}

//
// ─── DRY RUN ───────────────────────────────────────────────────────────────────
//

/// Backend stand-in that logs every call and grants every launch.
#[derive(Default)]
pub struct DryRunBackend {
    launches: Mutex<u32>,
}

#[async_trait]
impl AttemptBackend for DryRunBackend {
    async fn launch(&self, package_id: &PackageId) -> Result<LaunchGrant, BackendError> {
        let n = match self.launches.lock() {
            Ok(mut launches) => {
                *launches += 1;
                *launches
            }
            Err(_) => 0,
        };
        tracing::info!(%package_id, "dry-run launch");
        Ok(LaunchGrant {
            launch_url: Some(format!("https://cloud.scorm.com/dry-run/{package_id}")),
            scorm_attempt_id: Some(format!("dry-{n}")),
        })
    }

    async fn update_attempt(
        &self,
        attempt_id: &AttemptId,
        patch: &AttemptPatch,
    ) -> Result<(), BackendError> {
        tracing::info!(
            %attempt_id,
            percentage = patch.completion_percentage,
            status = patch.status.as_wire(),
            "dry-run PATCH /attempts"
        );
        Ok(())
    }

    async fn sync_progress(&self, attempt_id: &AttemptId) -> Result<SyncedAttempt, BackendError> {
        tracing::info!(%attempt_id, "dry-run PATCH /attempts/sync-progress");
        Ok(SyncedAttempt::default())
    }
}

pub struct DryRunBeacon;

impl BeaconTransport for DryRunBeacon {
    fn send(&self, attempt_id: &AttemptId, patch: AttemptPatch) {
        tracing::info!(
            %attempt_id,
            percentage = patch.completion_percentage,
            status = patch.status.as_wire(),
            "dry-run beacon"
        );
    }
}
