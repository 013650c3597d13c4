#![forbid(unsafe_code)]

pub mod coalesce;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod scorm;
pub mod time;

pub use error::Error;
pub use time::Clock;
