mod observer;
mod runtime;
mod session;

pub use observer::{ProgressObserver, TracingObserver};
pub use runtime::{PlayerCommand, run_player, spawn_player};
pub use session::{LessonState, MessageOutcome, PlayerServices, PlayerSession};
