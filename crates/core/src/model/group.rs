use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{GroupEpoch, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GroupError {
    #[error("a group must contain at least one question")]
    Empty,

    #[error("current index {index} exceeds group length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("unknown group mode: {0}")]
    UnknownMode(String),
}

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// Whether a group came from broad ratio sampling or from the wrong subset
/// of the previous group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    Normal,
    Reinforce,
}

impl GroupMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GroupMode::Normal => "normal",
            GroupMode::Reinforce => "reinforce",
        }
    }

    /// Parses the canonical string form.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::UnknownMode` for any other string.
    pub fn parse(value: &str) -> Result<Self, GroupError> {
        match value {
            "normal" => Ok(GroupMode::Normal),
            "reinforce" => Ok(GroupMode::Reinforce),
            other => Err(GroupError::UnknownMode(other.to_string())),
        }
    }
}

//
// ─── GROUP ─────────────────────────────────────────────────────────────────────
//

/// One ordered batch of questions presented together.
///
/// A group is never mutated once handed out, except for its current-index
/// pointer; a new batch always means a new group with a strictly greater
/// epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    epoch: GroupEpoch,
    mode: GroupMode,
    question_ids: Vec<QuestionId>,
    current_index: usize,
    created_at: DateTime<Utc>,
}

impl Group {
    /// Creates a fresh group positioned at its first question.
    ///
    /// Callers obtain the epoch from the owning session, which guarantees
    /// monotonicity.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::Empty` for an empty question list.
    pub fn new(
        epoch: GroupEpoch,
        mode: GroupMode,
        question_ids: Vec<QuestionId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, GroupError> {
        Self::from_persisted(epoch, mode, question_ids, 0, created_at)
    }

    /// Rehydrates a group from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::Empty` for an empty question list, or
    /// `GroupError::IndexOutOfBounds` if the stored pointer is past the end.
    pub fn from_persisted(
        epoch: GroupEpoch,
        mode: GroupMode,
        question_ids: Vec<QuestionId>,
        current_index: usize,
        created_at: DateTime<Utc>,
    ) -> Result<Self, GroupError> {
        if question_ids.is_empty() {
            return Err(GroupError::Empty);
        }
        if current_index > question_ids.len() {
            return Err(GroupError::IndexOutOfBounds {
                index: current_index,
                len: question_ids.len(),
            });
        }
        Ok(Self {
            epoch,
            mode,
            question_ids,
            current_index,
            created_at,
        })
    }

    #[must_use]
    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    #[must_use]
    pub fn mode(&self) -> GroupMode {
        self.mode
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.question_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.question_ids.is_empty()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn contains(&self, id: QuestionId) -> bool {
        self.question_ids.contains(&id)
    }

    #[must_use]
    pub fn position_of(&self, id: QuestionId) -> Option<usize> {
        self.question_ids.iter().position(|q| *q == id)
    }

    /// Moves the pointer forward to `index`, never backwards and never past
    /// the end of the group.
    pub fn advance_to(&mut self, index: usize) {
        let clamped = index.min(self.question_ids.len());
        if clamped > self.current_index {
            self.current_index = clamped;
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn ids(raw: &[u64]) -> Vec<QuestionId> {
        raw.iter().copied().map(QuestionId::new).collect()
    }

    #[test]
    fn empty_group_is_rejected() {
        let err = Group::new(GroupEpoch::new(1), GroupMode::Normal, Vec::new(), fixed_now())
            .unwrap_err();
        assert!(matches!(err, GroupError::Empty));
    }

    #[test]
    fn persisted_index_must_fit() {
        let err = Group::from_persisted(
            GroupEpoch::new(1),
            GroupMode::Normal,
            ids(&[1, 2]),
            3,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, GroupError::IndexOutOfBounds { index: 3, len: 2 }));
    }

    #[test]
    fn advance_is_forward_only_and_clamped() {
        let mut group =
            Group::new(GroupEpoch::new(1), GroupMode::Normal, ids(&[1, 2, 3]), fixed_now())
                .unwrap();

        group.advance_to(2);
        assert_eq!(group.current_index(), 2);

        group.advance_to(1);
        assert_eq!(group.current_index(), 2);

        group.advance_to(9);
        assert_eq!(group.current_index(), 3);
    }

    #[test]
    fn membership_lookup_preserves_order() {
        let group =
            Group::new(GroupEpoch::new(1), GroupMode::Reinforce, ids(&[5, 9]), fixed_now())
                .unwrap();

        assert!(group.contains(QuestionId::new(9)));
        assert_eq!(group.position_of(QuestionId::new(9)), Some(1));
        assert_eq!(group.position_of(QuestionId::new(7)), None);
    }

    #[test]
    fn mode_string_roundtrip() {
        assert_eq!(GroupMode::parse("normal").unwrap(), GroupMode::Normal);
        assert_eq!(GroupMode::parse("reinforce").unwrap(), GroupMode::Reinforce);
        assert!(matches!(
            GroupMode::parse("review"),
            Err(GroupError::UnknownMode(_))
        ));
    }
}
