use thiserror::Error;

use crate::model::{OutlineError, ParseIdError};
use crate::scorm::MalformedEvent;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Outline(#[from] OutlineError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
    #[error(transparent)]
    MalformedEvent(#[from] MalformedEvent),
}
