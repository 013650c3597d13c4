//! Last-chance write of the current progress when the page goes away.

use std::sync::Arc;

use portal_core::model::{AttemptHandle, AttemptId, ProgressSignal};

use crate::backend::AttemptPatch;

/// Non-blocking, best-effort transport for unload-time writes.
///
/// `send` must return immediately and the write must survive the caller
/// being torn down.
pub trait BeaconTransport: Send + Sync {
    fn send(&self, attempt_id: &AttemptId, patch: AttemptPatch);
}

#[derive(Clone)]
pub struct DurabilityGuard {
    transport: Arc<dyn BeaconTransport>,
}

impl DurabilityGuard {
    #[must_use]
    pub fn new(transport: Arc<dyn BeaconTransport>) -> Self {
        Self { transport }
    }

    /// Hands the current progress to the beacon transport.
    ///
    /// Returns `false` without writing when there is no active attempt or
    /// nothing has been recorded yet.
    pub fn on_unload(&self, handle: Option<&AttemptHandle>, signal: ProgressSignal) -> bool {
        let Some(handle) = handle else {
            return false;
        };
        if !signal.has_activity() {
            return false;
        }
        let patch = AttemptPatch::from_percentage(signal.percentage());
        tracing::info!(
            attempt_id = %handle.attempt_id(),
            percentage = patch.completion_percentage,
            "unload write handed to beacon"
        );
        self.transport.send(handle.attempt_id(), patch);
        true
    }
}
