//! Error taxonomy for the scheduling core.
//!
//! Hand-rolled rather than built on `thiserror`/`anyhow`, matching the rest
//! of this codebase's conventions for fallible operations.

use std::fmt;

/// Errors surfaced across the Scheduler/StudySession boundary.
#[derive(Debug)]
pub enum CoreError {
    /// No card exists with the given id.
    CardNotFound(i64),
    /// A session method was called before `start`.
    SessionNotStarted,
    /// A session method was called after `end`.
    SessionClosed,
    /// `undo_last_review` was called with no review log to undo.
    NothingToUndo,
    /// A caller-supplied parameter violates a documented constraint.
    InvalidParameter(String),
    /// The backing store could not complete the operation.
    StoreUnavailable(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CardNotFound(id) => write!(f, "card {id} not found"),
            Self::SessionNotStarted => write!(f, "session has not been started"),
            Self::SessionClosed => write!(f, "session is closed"),
            Self::NothingToUndo => write!(f, "no review to undo"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

pub type CoreResult<T> = Result<T, CoreError>;
