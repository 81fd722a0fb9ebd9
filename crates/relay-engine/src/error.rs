//! Error taxonomy for operations callers can observe directly.
//!
//! Subcomponent failures that the room must isolate (translator, synthesis,
//! store) are handled at the point of failure — fallback, identity record,
//! drop-and-log — and never surface here. This enum only covers the calls
//! an external caller makes directly into the engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("patch is stale (version did not advance)")]
    Stale,

    #[error("patch became empty after filler stripping")]
    EmptyAfterFilter,

    #[error("room window not yet open")]
    WindowNotOpen,

    #[error("room window has expired")]
    WindowExpired,

    #[error("room {0:?} not found")]
    RoomNotFound(String),

    #[error("store error: {0}")]
    Store(String),
}

impl RelayError {
    /// The HTTP-equivalent status a front-end should answer with, per §7's
    /// "Room window closed" policy (retriable vs terminal).
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::WindowNotOpen => 403,
            RelayError::WindowExpired => 410,
            RelayError::RoomNotFound(_) => 404,
            RelayError::Validation(_) => 400,
            _ => 500,
        }
    }
}
