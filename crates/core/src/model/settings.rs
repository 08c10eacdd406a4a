use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::BankId;
use crate::model::question::QuestionType;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Validation failures for practice settings.
///
/// These are rejected at settings-save time, before any session state
/// exists; downstream components may assume a validated configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("at least one question bank must be selected")]
    EmptyBankSet,

    #[error("target group size must be > 0")]
    ZeroTargetCount,

    #[error("type ratio percentages must sum to 100 or be all zero, got {sum}")]
    RatioSum { sum: u32 },
}

//
// ─── TYPE RATIO ────────────────────────────────────────────────────────────────
//

/// Per-type percentage shares for group sampling.
///
/// Valid forms: four percentages summing to exactly 100, or all zero,
/// which means "split uniformly across all types".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRatio {
    single_choice: u8,
    multi_choice: u8,
    judgment: u8,
    short_answer: u8,
}

impl TypeRatio {
    /// Creates a validated ratio.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::RatioSum` unless the four percentages sum to
    /// 100 or are all zero.
    pub fn new(
        single_choice: u8,
        multi_choice: u8,
        judgment: u8,
        short_answer: u8,
    ) -> Result<Self, SettingsError> {
        let sum = u32::from(single_choice)
            + u32::from(multi_choice)
            + u32::from(judgment)
            + u32::from(short_answer);
        if sum != 100 && sum != 0 {
            return Err(SettingsError::RatioSum { sum });
        }
        Ok(Self {
            single_choice,
            multi_choice,
            judgment,
            short_answer,
        })
    }

    /// The all-zero ratio: every type participates with a uniform share.
    #[must_use]
    pub fn uniform() -> Self {
        Self {
            single_choice: 0,
            multi_choice: 0,
            judgment: 0,
            short_answer: 0,
        }
    }

    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.single_choice == 0
            && self.multi_choice == 0
            && self.judgment == 0
            && self.short_answer == 0
    }

    #[must_use]
    pub fn percent(&self, kind: QuestionType) -> u8 {
        match kind {
            QuestionType::SingleChoice => self.single_choice,
            QuestionType::MultiChoice => self.multi_choice,
            QuestionType::Judgment => self.judgment,
            QuestionType::ShortAnswer => self.short_answer,
        }
    }

    /// Types that take part in sampling: those with a non-zero share, or
    /// every type when the ratio is uniform.
    #[must_use]
    pub fn participating_kinds(&self) -> Vec<QuestionType> {
        if self.is_uniform() {
            return QuestionType::ALL.to_vec();
        }
        QuestionType::ALL
            .into_iter()
            .filter(|kind| self.percent(*kind) > 0)
            .collect()
    }
}

impl Default for TypeRatio {
    fn default() -> Self {
        Self::uniform()
    }
}

//
// ─── PRACTICE SETTINGS ─────────────────────────────────────────────────────────
//

/// User configuration driving session creation.
///
/// A snapshot of these settings is frozen into each session at start time,
/// so later edits never disturb a session in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeSettings {
    bank_ids: Vec<BankId>,
    type_ratio: TypeRatio,
    target_count: u32,
    realtime_analysis: bool,
}

impl PracticeSettings {
    /// Creates validated settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::EmptyBankSet` if no banks are selected, or
    /// `SettingsError::ZeroTargetCount` for a zero group size.
    pub fn new(
        bank_ids: Vec<BankId>,
        type_ratio: TypeRatio,
        target_count: u32,
        realtime_analysis: bool,
    ) -> Result<Self, SettingsError> {
        if bank_ids.is_empty() {
            return Err(SettingsError::EmptyBankSet);
        }
        if target_count == 0 {
            return Err(SettingsError::ZeroTargetCount);
        }
        Ok(Self {
            bank_ids,
            type_ratio,
            target_count,
            realtime_analysis,
        })
    }

    #[must_use]
    pub fn bank_ids(&self) -> &[BankId] {
        &self.bank_ids
    }

    #[must_use]
    pub fn type_ratio(&self) -> &TypeRatio {
        &self.type_ratio
    }

    #[must_use]
    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    /// Display-only toggle: whether per-answer feedback (standard answer)
    /// is revealed immediately. Never changes scheduling.
    #[must_use]
    pub fn realtime_analysis(&self) -> bool {
        self.realtime_analysis
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
