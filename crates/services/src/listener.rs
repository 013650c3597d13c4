//! Authenticity and relevance gate for messages from the embedded runtime.

use portal_core::model::AttemptTag;
use portal_core::reconcile::ProgressUpdate;
use portal_core::scorm::{MalformedEvent, RuntimeEvent, decode_message};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// A message arriving at the player.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Cross-origin message posted by the runtime frame.
    ///
    /// `handle_epoch` is the epoch of the handle whose launch address the
    /// posting frame was loaded from. The host stamps it when it points the
    /// frame at a new launch, so messages still in flight from an earlier
    /// document never reach a later attempt.
    Message {
        origin: String,
        data: Value,
        handle_epoch: u64,
    },
    /// In-process "session ended" notice; exempt from the origin check.
    SessionEnded,
}

impl Inbound {
    #[must_use]
    pub fn message(origin: impl Into<String>, data: Value, handle_epoch: u64) -> Self {
        Self::Message {
            origin: origin.into(),
            data,
            handle_epoch,
        }
    }
}

/// Normalized output handed to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerSignal {
    Progress(ProgressUpdate),
    SessionEnded,
}

/// Why a message never reached the reconciler. Logged, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Dropped {
    #[error("untrusted origin {0}")]
    UntrustedOrigin(String),
    #[error("no active attempt")]
    NoActiveAttempt,
    #[error("message from superseded launch (epoch {0})")]
    SupersededLaunch(u64),
    #[error(transparent)]
    Malformed(#[from] MalformedEvent),
}

#[derive(Debug, Clone)]
pub struct ProgressListener {
    trusted_host: String,
}

impl ProgressListener {
    /// `trusted_host` is the runtime's host; its subdomains are trusted too.
    #[must_use]
    pub fn new(trusted_host: impl Into<String>) -> Self {
        let trusted_host = trusted_host
            .into()
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        Self { trusted_host }
    }

    #[must_use]
    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        if self.trusted_host.is_empty() {
            return false;
        }
        let Ok(url) = Url::parse(origin) else {
            return false;
        };
        if !matches!(url.scheme(), "https" | "http") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        host == self.trusted_host
            || host
                .strip_suffix(&self.trusted_host)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Filters and normalizes one inbound message against the active handle.
    ///
    /// # Errors
    ///
    /// Returns the reason the message was dropped.
    pub fn accept(
        &self,
        inbound: Inbound,
        active: Option<&AttemptTag>,
    ) -> Result<ListenerSignal, Dropped> {
        let (origin, data, handle_epoch) = match inbound {
            Inbound::SessionEnded => {
                return match active {
                    Some(_) => Ok(ListenerSignal::SessionEnded),
                    None => Err(Dropped::NoActiveAttempt),
                };
            }
            Inbound::Message {
                origin,
                data,
                handle_epoch,
            } => (origin, data, handle_epoch),
        };

        if !self.is_trusted_origin(&origin) {
            return Err(Dropped::UntrustedOrigin(origin));
        }
        let Some(active) = active else {
            return Err(Dropped::NoActiveAttempt);
        };
        if handle_epoch != active.epoch {
            return Err(Dropped::SupersededLaunch(handle_epoch));
        }

        Ok(match decode_message(&data)? {
            RuntimeEvent::Progress { percentage } => {
                ListenerSignal::Progress(ProgressUpdate::progress(percentage))
            }
            RuntimeEvent::Completed => ListenerSignal::Progress(ProgressUpdate::completion()),
            RuntimeEvent::SessionEnded => ListenerSignal::SessionEnded,
        })
    }
}
