use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{BankId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question content cannot be empty")]
    EmptyContent,

    #[error("standard answer cannot be empty")]
    EmptyStandardAnswer,

    #[error("{kind} questions require at least one option")]
    MissingOptions { kind: QuestionType },

    #[error("short-answer questions cannot carry options")]
    UnexpectedOptions,

    #[error("unknown question type: {0}")]
    UnknownType(String),
}

//
// ─── QUESTION TYPE ─────────────────────────────────────────────────────────────
//

/// The four supported question shapes.
///
/// The type drives both grading (how a submitted value is normalized before
/// comparison) and sampling (the per-type ratio quota it falls into).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultiChoice,
    Judgment,
    ShortAnswer,
}

impl QuestionType {
    /// All types, in the canonical display/interleave order.
    pub const ALL: [QuestionType; 4] = [
        QuestionType::SingleChoice,
        QuestionType::MultiChoice,
        QuestionType::Judgment,
        QuestionType::ShortAnswer,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultiChoice => "multi_choice",
            QuestionType::Judgment => "judgment",
            QuestionType::ShortAnswer => "short_answer",
        }
    }

    /// Parses the canonical string form produced by [`QuestionType::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::UnknownType` for any other string.
    pub fn parse(value: &str) -> Result<Self, QuestionError> {
        match value {
            "single_choice" => Ok(QuestionType::SingleChoice),
            "multi_choice" => Ok(QuestionType::MultiChoice),
            "judgment" => Ok(QuestionType::Judgment),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            other => Err(QuestionError::UnknownType(other.to_string())),
        }
    }

    /// Whether this type presents a fixed option list to the learner.
    #[must_use]
    pub fn has_options(self) -> bool {
        !matches!(self, QuestionType::ShortAnswer)
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

/// One selectable option of a choice/judgment question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub key: String,
    pub text: String,
}

impl ChoiceOption {
    #[must_use]
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A pool question as the scheduler sees it.
///
/// Content, options, and the standard answer are owned by the question-bank
/// store and read-only here; the only field the scheduler mutates is the
/// mastery counter (and the `reported` exclusion flag via feedback-and-skip).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    bank_id: BankId,
    kind: QuestionType,
    content: String,
    options: Vec<ChoiceOption>,
    standard_answer: String,
    mastery: u32,
    favorite: bool,
    reported: bool,
    created_at: DateTime<Utc>,
}

impl Question {
    /// Creates a fresh question with a zero mastery counter and clear flags.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if content or the standard answer is blank,
    /// or if the option list does not match the question type.
    pub fn new(
        id: QuestionId,
        bank_id: BankId,
        kind: QuestionType,
        content: impl Into<String>,
        options: Vec<ChoiceOption>,
        standard_answer: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        Self::from_persisted(
            id,
            bank_id,
            kind,
            content,
            options,
            standard_answer,
            0,
            false,
            false,
            created_at,
        )
    }

    /// Rehydrates a question from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` under the same conditions as [`Question::new`].
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: QuestionId,
        bank_id: BankId,
        kind: QuestionType,
        content: impl Into<String>,
        options: Vec<ChoiceOption>,
        standard_answer: impl Into<String>,
        mastery: u32,
        favorite: bool,
        reported: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        let content = content.into();
        let standard_answer = standard_answer.into();

        if content.trim().is_empty() {
            return Err(QuestionError::EmptyContent);
        }
        if standard_answer.trim().is_empty() {
            return Err(QuestionError::EmptyStandardAnswer);
        }
        if kind.has_options() && options.is_empty() {
            return Err(QuestionError::MissingOptions { kind });
        }
        if !kind.has_options() && !options.is_empty() {
            return Err(QuestionError::UnexpectedOptions);
        }

        Ok(Self {
            id,
            bank_id,
            kind,
            content,
            options,
            standard_answer,
            mastery,
            favorite,
            reported,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn bank_id(&self) -> BankId {
        self.bank_id
    }

    #[must_use]
    pub fn kind(&self) -> QuestionType {
        self.kind
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn options(&self) -> &[ChoiceOption] {
        &self.options
    }

    #[must_use]
    pub fn standard_answer(&self) -> &str {
        &self.standard_answer
    }

    /// Consecutive-correct streak used to bias sampling away from
    /// well-known questions.
    #[must_use]
    pub fn mastery(&self) -> u32 {
        self.mastery
    }

    #[must_use]
    pub fn is_favorite(&self) -> bool {
        self.favorite
    }

    /// A reported question is excluded from sampling until the flag clears.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        self.reported
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Applies a counted-correct answer: the streak grows by exactly one.
    pub fn record_correct(&mut self) {
        self.mastery = self.mastery.saturating_add(1);
    }

    /// Applies a counted-wrong answer: the streak resets to zero,
    /// whatever its prior value.
    pub fn reset_mastery(&mut self) {
        self.mastery = 0;
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        self.favorite = favorite;
    }

    pub fn set_reported(&mut self, reported: bool) {
        self.reported = reported;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn options_ab() -> Vec<ChoiceOption> {
        vec![ChoiceOption::new("A", "first"), ChoiceOption::new("B", "second")]
    }

    #[test]
    fn new_question_starts_unmastered() {
        let q = Question::new(
            QuestionId::new(1),
            BankId::new(1),
            QuestionType::SingleChoice,
            "Pick one",
            options_ab(),
            "A",
            fixed_now(),
        )
        .unwrap();

        assert_eq!(q.mastery(), 0);
        assert!(!q.is_favorite());
        assert!(!q.is_reported());
    }

    #[test]
    fn blank_content_is_rejected() {
        let err = Question::new(
            QuestionId::new(1),
            BankId::new(1),
            QuestionType::SingleChoice,
            "   ",
            options_ab(),
            "A",
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, QuestionError::EmptyContent));
    }

    #[test]
    fn choice_question_requires_options() {
        let err = Question::new(
            QuestionId::new(1),
            BankId::new(1),
            QuestionType::MultiChoice,
            "Pick many",
            Vec::new(),
            "A,B",
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, QuestionError::MissingOptions { .. }));
    }

    #[test]
    fn short_answer_rejects_options() {
        let err = Question::new(
            QuestionId::new(1),
            BankId::new(1),
            QuestionType::ShortAnswer,
            "Explain",
            options_ab(),
            "because",
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, QuestionError::UnexpectedOptions));
    }

    #[test]
    fn mastery_increments_and_resets() {
        let mut q = Question::new(
            QuestionId::new(1),
            BankId::new(1),
            QuestionType::Judgment,
            "True or false",
            vec![ChoiceOption::new("T", "true"), ChoiceOption::new("F", "false")],
            "T",
            fixed_now(),
        )
        .unwrap();

        q.record_correct();
        q.record_correct();
        assert_eq!(q.mastery(), 2);

        q.reset_mastery();
        assert_eq!(q.mastery(), 0);
    }

    #[test]
    fn type_string_roundtrip() {
        for kind in QuestionType::ALL {
            assert_eq!(QuestionType::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(matches!(
            QuestionType::parse("essay"),
            Err(QuestionError::UnknownType(_))
        ));
    }
}
