use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::group::{Group, GroupError, GroupMode};
use crate::model::ids::{GroupEpoch, QuestionId, SessionId, UserId};
use crate::model::settings::PracticeSettings;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("unknown session status: {0}")]
    UnknownStatus(String),

    #[error("round number must be >= 1, got {0}")]
    InvalidRound(u32),

    #[error("group epoch {group} is not below the next allocatable epoch {next}")]
    EpochOrder { group: u64, next: u64 },

    #[error("session is completed; no further groups can be built")]
    Completed,

    #[error(transparent)]
    Group(#[from] GroupError),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle state of a practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Broad ratio-sampled practice.
    Normal,
    /// Re-attempting the wrong subset of the previous group.
    Reinforcing,
    /// Terminal; reached only through an explicit finish or reset.
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Normal => "normal",
            SessionStatus::Reinforcing => "reinforcing",
            SessionStatus::Completed => "completed",
        }
    }

    /// Parses the canonical string form.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownStatus` for any other string.
    pub fn parse(value: &str) -> Result<Self, SessionError> {
        match value {
            "normal" => Ok(SessionStatus::Normal),
            "reinforcing" => Ok(SessionStatus::Reinforcing),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(SessionError::UnknownStatus(other.to_string())),
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One user's active smart-practice session.
///
/// Owns the round counter, the current group, and the epoch allocator.
/// Every group is created through this type, which is how the "epoch
/// strictly greater than any prior group's" invariant is enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeSession {
    id: SessionId,
    user_id: UserId,
    status: SessionStatus,
    round: u32,
    settings: PracticeSettings,
    current_group: Group,
    next_epoch: GroupEpoch,
    used_question_ids: HashSet<QuestionId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PracticeSession {
    /// Starts a new session around its first ratio-sampled group.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Group` if the question list is empty.
    pub fn start(
        id: SessionId,
        user_id: UserId,
        settings: PracticeSettings,
        first_group: Vec<QuestionId>,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let epoch = GroupEpoch::new(1);
        let group = Group::new(epoch, GroupMode::Normal, first_group, now)?;
        let used_question_ids = group.question_ids().iter().copied().collect();

        Ok(Self {
            id,
            user_id,
            status: SessionStatus::Normal,
            round: 1,
            settings,
            current_group: group,
            next_epoch: epoch.next(),
            used_question_ids,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rehydrates a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidRound` for a zero round and
    /// `SessionError::EpochOrder` if the current group's epoch has not been
    /// allocated below `next_epoch`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        status: SessionStatus,
        round: u32,
        settings: PracticeSettings,
        current_group: Group,
        next_epoch: GroupEpoch,
        used_question_ids: HashSet<QuestionId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if round == 0 {
            return Err(SessionError::InvalidRound(round));
        }
        if current_group.epoch() >= next_epoch {
            return Err(SessionError::EpochOrder {
                group: current_group.epoch().value(),
                next: next_epoch.value(),
            });
        }

        Ok(Self {
            id,
            user_id,
            status,
            round,
            settings,
            current_group,
            next_epoch,
            used_question_ids,
            created_at,
            updated_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub fn settings(&self) -> &PracticeSettings {
        &self.settings
    }

    #[must_use]
    pub fn current_group(&self) -> &Group {
        &self.current_group
    }

    #[must_use]
    pub fn next_epoch(&self) -> GroupEpoch {
        self.next_epoch
    }

    /// Ids handed out by any normal group of this session; the sampler's
    /// exclusion set.
    #[must_use]
    pub fn used_question_ids(&self) -> &HashSet<QuestionId> {
        &self.used_question_ids
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves the current group's position pointer (forward only).
    pub fn note_position(&mut self, index: usize, now: DateTime<Utc>) {
        self.current_group.advance_to(index);
        self.updated_at = now;
    }

    /// Enters (or stays in) reinforcement: the next group is exactly the
    /// still-wrong subset, the round does not advance.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` on a finished session, or
    /// `SessionError::Group` for an empty subset.
    pub fn begin_reinforce_group(
        &mut self,
        wrong: Vec<QuestionId>,
        now: DateTime<Utc>,
    ) -> Result<&Group, SessionError> {
        if self.is_completed() {
            return Err(SessionError::Completed);
        }
        let group = Group::new(self.next_epoch, GroupMode::Reinforce, wrong, now)?;
        self.next_epoch = self.next_epoch.next();
        self.current_group = group;
        self.status = SessionStatus::Reinforcing;
        self.updated_at = now;
        Ok(&self.current_group)
    }

    /// Returns to broad sampling: round + 1, fresh normal group.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` on a finished session, or
    /// `SessionError::Group` for an empty question list.
    pub fn begin_next_round_group(
        &mut self,
        question_ids: Vec<QuestionId>,
        now: DateTime<Utc>,
    ) -> Result<&Group, SessionError> {
        if self.is_completed() {
            return Err(SessionError::Completed);
        }
        let group = Group::new(self.next_epoch, GroupMode::Normal, question_ids, now)?;
        self.next_epoch = self.next_epoch.next();
        self.used_question_ids
            .extend(group.question_ids().iter().copied());
        self.current_group = group;
        self.status = SessionStatus::Normal;
        self.round += 1;
        self.updated_at = now;
        Ok(&self.current_group)
    }

    /// Forgets which questions have been handed out, so sampling can
    /// recycle an exhausted pool.
    pub fn clear_used_questions(&mut self) {
        self.used_question_ids.clear();
    }

    /// Explicit terminal transition; the state machine never reaches
    /// `Completed` on its own.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Completed;
        self.updated_at = now;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
