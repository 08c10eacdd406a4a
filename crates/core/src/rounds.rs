//! Round state machine.
//!
//! Transitions are evaluated only once every question in the current group
//! has a counted answer. A group with any wrong answer is followed by a
//! reinforcement pass over exactly that wrong subset; a clean group opens
//! the next round with a fresh ratio sample. The `Completed` status is
//! never reached from here — only an explicit finish or reset ends a
//! session, otherwise it loops across rounds indefinitely.

use crate::model::QuestionId;

/// Decision taken at group completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundTransition {
    /// Re-attempt the wrong subset in isolation; the round does not advance.
    Reinforce { wrong: Vec<QuestionId> },
    /// All answers correct: advance the round and sample a fresh group.
    NextRound,
}

/// Evaluates the completed group's outcomes, in group order.
///
/// The wrong subset preserves the presentation order of the finished group,
/// so a reinforcement pass walks the questions in a familiar sequence.
#[must_use]
pub fn evaluate(outcomes: &[(QuestionId, bool)]) -> RoundTransition {
    let wrong: Vec<QuestionId> = outcomes
        .iter()
        .filter(|(_, correct)| !correct)
        .map(|(id, _)| *id)
        .collect();

    if wrong.is_empty() {
        RoundTransition::NextRound
    } else {
        RoundTransition::Reinforce { wrong }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
