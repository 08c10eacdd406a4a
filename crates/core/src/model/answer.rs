use chrono::{DateTime, Utc};

use crate::model::ids::{GroupEpoch, QuestionId, SessionId};

//
// ─── KEY ───────────────────────────────────────────────────────────────────────
//

/// Ledger key: one entry per (session, question, group epoch).
///
/// Answers never migrate across epochs — a rebuilt group starts with a
/// clean slate even for a question it shares with its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnswerKey {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub epoch: GroupEpoch,
}

impl AnswerKey {
    #[must_use]
    pub fn new(session_id: SessionId, question_id: QuestionId, epoch: GroupEpoch) -> Self {
        Self {
            session_id,
            question_id,
            epoch,
        }
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// One recorded answer.
///
/// `counted` marks whether this entry has already driven the mastery-counter
/// mutation; it transitions false→true at most once and is sticky from then
/// on, which is what makes re-submission idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    key: AnswerKey,
    submitted: String,
    is_correct: bool,
    counted: bool,
    answered_at: DateTime<Utc>,
}

impl AnswerRecord {
    #[must_use]
    pub fn new(
        key: AnswerKey,
        submitted: impl Into<String>,
        is_correct: bool,
        counted: bool,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            submitted: submitted.into(),
            is_correct,
            counted,
            answered_at,
        }
    }

    #[must_use]
    pub fn key(&self) -> AnswerKey {
        self.key
    }

    #[must_use]
    pub fn submitted(&self) -> &str {
        &self.submitted
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }

    #[must_use]
    pub fn is_counted(&self) -> bool {
        self.counted
    }

    #[must_use]
    pub fn answered_at(&self) -> DateTime<Utc> {
        self.answered_at
    }

    /// Overwrites the submission and its verdict; the counted flag is
    /// preserved (sticky once set).
    pub fn resubmit(
        &mut self,
        submitted: impl Into<String>,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) {
        self.submitted = submitted.into();
        self.is_correct = is_correct;
        self.answered_at = answered_at;
    }

    /// Marks the counter mutation as applied.
    pub fn mark_counted(&mut self) {
        self.counted = true;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn key() -> AnswerKey {
        AnswerKey::new(SessionId::generate(), QuestionId::new(7), GroupEpoch::new(1))
    }

    #[test]
    fn resubmit_updates_verdict_but_keeps_counted() {
        let mut record = AnswerRecord::new(key(), "A", false, true, fixed_now());

        record.resubmit("B", true, fixed_now());

        assert_eq!(record.submitted(), "B");
        assert!(record.is_correct());
        assert!(record.is_counted());
    }

    #[test]
    fn mark_counted_is_one_way() {
        let mut record = AnswerRecord::new(key(), "A", true, false, fixed_now());
        assert!(!record.is_counted());

        record.mark_counted();
        record.resubmit("C", false, fixed_now());
        assert!(record.is_counted());
    }
}
