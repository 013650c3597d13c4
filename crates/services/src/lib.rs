#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod durability;
pub mod error;
pub mod listener;
pub mod player;
pub mod resolver;

pub use portal_core::Clock;

pub use backend::{AttemptBackend, AttemptPatch, HttpAttemptBackend, HttpBeacon, LaunchGrant, SyncedAttempt};
pub use config::SyncConfig;
pub use dispatcher::{SyncChannel, SyncDispatcher, SyncJob, SyncOutcome};
pub use durability::{BeaconTransport, DurabilityGuard};
pub use error::{BackendError, PlayerError, SyncError};
pub use listener::{Dropped, Inbound, ListenerSignal, ProgressListener};
pub use player::{
    LessonState, MessageOutcome, PlayerCommand, PlayerServices, PlayerSession, ProgressObserver,
    TracingObserver, run_player, spawn_player,
};
pub use resolver::AttemptResolver;
