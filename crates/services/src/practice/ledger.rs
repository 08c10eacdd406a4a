//! Answer-ledger decision logic.
//!
//! Pure: given the existing entry for a key and the freshly computed
//! verdict, decides what to write and whether the mastery counter moves.
//! The counter moves only on the false→true transition of the `counted`
//! flag; once an entry is counted, later submissions recompute the verdict
//! for feedback but never mutate again.

use chrono::{DateTime, Utc};

use practice_core::model::{AnswerKey, AnswerRecord};
use storage::repository::CounterMutation;

/// What a submission resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LedgerDecision {
    pub record: AnswerRecord,
    pub mutation: CounterMutation,
    pub counted_this_call: bool,
}

pub(crate) fn decide(
    key: AnswerKey,
    existing: Option<AnswerRecord>,
    submitted: &str,
    is_correct: bool,
    now: DateTime<Utc>,
) -> LedgerDecision {
    match existing {
        Some(mut record) if record.is_counted() => {
            record.resubmit(submitted, is_correct, now);
            LedgerDecision {
                record,
                mutation: CounterMutation::None,
                counted_this_call: false,
            }
        }
        // First submission for this key, or a retry after a failed counter
        // commit left the entry uncounted.
        _ => {
            let record = AnswerRecord::new(key, submitted, is_correct, true, now);
            let mutation = if is_correct {
                CounterMutation::Increment
            } else {
                CounterMutation::Reset
            };
            LedgerDecision {
                record,
                mutation,
                counted_this_call: true,
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
