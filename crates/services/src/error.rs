//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::model::{GroupEpoch, QuestionId, SessionError, SettingsError};
use storage::repository::StorageError;

/// Errors emitted by `PracticeService`.
///
/// None of these are fatal to the process: every failure is local to one
/// session and recoverable by fixing the input or refetching the current
/// group.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PracticeError {
    #[error(transparent)]
    Validation(#[from] SettingsError),

    #[error("no practice settings saved for this user")]
    NoActiveSettings,

    #[error("practice session not found")]
    SessionNotFound,

    #[error("practice session is already completed")]
    SessionCompleted,

    #[error("selected banks contain no usable questions")]
    EmptyPool,

    /// The submission targets a superseded group. The prior group's ledger
    /// entries are intact; the caller should refetch the current group and
    /// resubmit.
    #[error("stale group epoch {submitted}, current epoch is {current}")]
    StaleGroup {
        submitted: GroupEpoch,
        current: GroupEpoch,
    },

    #[error("question {0} is not part of the current group")]
    QuestionNotInGroup(QuestionId),

    #[error("{} question(s) in the current group are still unanswered", missing.len())]
    GroupIncomplete { missing: Vec<QuestionId> },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
