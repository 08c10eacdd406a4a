use std::collections::BTreeMap;

use serde::Serialize;

use practice_core::model::{
    BankId, ChoiceOption, GroupEpoch, GroupMode, QuestionId, QuestionType, SessionId,
    SessionStatus,
};
use practice_core::sampler::TypeSelection;

//
// ─── GROUP & SESSION SNAPSHOTS ─────────────────────────────────────────────────
//

/// One question of the current group, joined with its ledger state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub kind: QuestionType,
    pub content: String,
    pub options: Vec<ChoiceOption>,
    pub mastery: u32,
    pub favorite: bool,
    pub submitted: Option<String>,
    pub is_correct: Option<bool>,
    pub counted: Option<bool>,
    /// Present only while realtime analysis is on.
    pub standard_answer: Option<String>,
}

/// The session's current group as presented to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSnapshot {
    pub session_id: SessionId,
    pub epoch: GroupEpoch,
    pub mode: GroupMode,
    pub status: SessionStatus,
    pub round: u32,
    pub total: usize,
    pub current_index: usize,
    /// Slots the pool could not fill when this group was sampled
    /// (the `PoolExhausted` condition); zero for reinforcement groups.
    pub shortfall: u32,
    /// Per-type selection summary; empty for reinforcement groups.
    pub selection: Vec<TypeSelection>,
    pub questions: Vec<QuestionView>,
}

/// Result of starting or resuming a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub round: u32,
    pub realtime_analysis: bool,
    /// True when an existing session was returned instead of a new one.
    pub resumed: bool,
    pub group: GroupSnapshot,
}

//
// ─── ANSWER OUTCOME ────────────────────────────────────────────────────────────
//

/// Per-answer verdict returned by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    /// True exactly once per (session, question, epoch) key: the call that
    /// applied the mastery-counter mutation.
    pub counted_this_call: bool,
    /// The question's mastery counter after this call.
    pub mastery: u32,
    /// Present only while realtime analysis is on.
    pub standard_answer: Option<String>,
}

//
// ─── STATUS SNAPSHOT ───────────────────────────────────────────────────────────
//

/// Aggregates for the active session's current group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSessionStatus {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub round: u32,
    pub epoch: GroupEpoch,
    pub group_total: usize,
    pub answered: usize,
    pub correct: usize,
    pub wrong: usize,
    pub pending: usize,
}

/// Per-bank mastery aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankStats {
    pub bank_id: BankId,
    pub distribution: BTreeMap<u32, u64>,
    /// Questions still at mastery zero in this bank.
    pub lowest_count_remaining: u64,
}

/// Read-only dashboard aggregates; producing one never mutates state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub session: Option<ActiveSessionStatus>,
    /// Mastery histogram across the configured banks.
    pub mastery_distribution: BTreeMap<u32, u64>,
    pub per_bank: Vec<BankStats>,
}
