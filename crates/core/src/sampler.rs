//! Ratio-driven group sampling.
//!
//! Given a candidate pool, a type-ratio configuration, and a target group
//! size, selects an ordered question list biased toward the lowest mastery
//! counter within each type bucket. Quotas follow the largest-remainder
//! method so they always sum to the target; buckets that cannot fill their
//! quota surrender the slots to buckets with spare candidates. When the pool
//! as a whole falls short the outcome carries a non-zero `shortfall` instead
//! of failing, so callers can surface "reduce target count or add questions".

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rand::rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::model::{Question, QuestionId, QuestionType, TypeRatio};

//
// ─── OUTCOME ───────────────────────────────────────────────────────────────────
//

/// Per-type slice of a sampling outcome: how many questions of the type
/// were selected, broken down by their mastery level at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSelection {
    pub kind: QuestionType,
    pub selected: u32,
    pub by_mastery: BTreeMap<u32, u32>,
}

/// Result of one sampling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Selected questions, types interleaved round-robin.
    pub question_ids: Vec<QuestionId>,
    /// Slots the pool could not fill; zero when the target was met.
    pub shortfall: u32,
    /// Selection summary per participating type.
    pub by_type: Vec<TypeSelection>,
}

impl SampleOutcome {
    /// The `PoolExhausted` condition: the pool could not fill the target.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.shortfall > 0
    }
}

//
// ─── QUOTA ALLOCATION ──────────────────────────────────────────────────────────
//

/// Largest-remainder quota split: floor each share, then hand leftover
/// slots to the types with the largest fractional remainders.
fn allocate_quotas(
    target_count: u32,
    kinds: &[QuestionType],
    ratio: &TypeRatio,
) -> HashMap<QuestionType, u32> {
    let mut quotas: HashMap<QuestionType, u32> = HashMap::with_capacity(kinds.len());

    if ratio.is_uniform() {
        let n = u32::try_from(kinds.len()).unwrap_or(1);
        let base = target_count / n;
        let remainder = target_count % n;
        for (i, kind) in kinds.iter().enumerate() {
            let extra = u32::from(u32::try_from(i).unwrap_or(u32::MAX) < remainder);
            quotas.insert(*kind, base + extra);
        }
        return quotas;
    }

    let mut remainders: Vec<(QuestionType, f64)> = Vec::with_capacity(kinds.len());
    let mut assigned = 0_u32;
    for kind in kinds {
        let raw = f64::from(target_count) * f64::from(ratio.percent(*kind)) / 100.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let base = raw.floor() as u32;
        quotas.insert(*kind, base);
        assigned += base;
        remainders.push((*kind, raw - raw.floor()));
    }

    // Stable sort keeps the declaration order among equal remainders.
    remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut leftover = target_count.saturating_sub(assigned);
    for (kind, _) in remainders {
        if leftover == 0 {
            break;
        }
        if let Some(q) = quotas.get_mut(&kind) {
            *q += 1;
            leftover -= 1;
        }
    }

    quotas
}

//
// ─── SAMPLING ──────────────────────────────────────────────────────────────────
//

/// Selects up to `target_count` questions from `pool`.
///
/// Candidates in `exclude` (already seen this session) and questions with a
/// pending issue report are dropped before quota selection. Within a type
/// bucket candidates are ordered by ascending mastery; ties are broken by a
/// uniform random shuffle so equally-mastered questions rotate between
/// calls.
#[must_use]
pub fn sample(
    pool: &[Question],
    ratio: &TypeRatio,
    target_count: u32,
    exclude: &HashSet<QuestionId>,
) -> SampleOutcome {
    let kinds = ratio.participating_kinds();

    let mut buckets: HashMap<QuestionType, Vec<&Question>> =
        kinds.iter().map(|kind| (*kind, Vec::new())).collect();
    for question in pool {
        if exclude.contains(&question.id()) || question.is_reported() {
            continue;
        }
        if let Some(bucket) = buckets.get_mut(&question.kind()) {
            bucket.push(question);
        }
    }

    // Shuffle first, then a stable sort on mastery: equal counters keep
    // their shuffled order, everything else surfaces lowest-counter-first.
    let mut rng = rng();
    for bucket in buckets.values_mut() {
        bucket.as_mut_slice().shuffle(&mut rng);
        bucket.sort_by_key(|q| q.mastery());
    }

    let quotas = allocate_quotas(target_count, &kinds, ratio);

    let mut taken: HashMap<QuestionType, usize> = HashMap::with_capacity(kinds.len());
    let mut missing = 0_u32;
    for kind in &kinds {
        let quota = usize::try_from(*quotas.get(kind).unwrap_or(&0)).unwrap_or(usize::MAX);
        let available = buckets.get(kind).map_or(0, Vec::len);
        let take = quota.min(available);
        taken.insert(*kind, take);
        missing += u32::try_from(quota - take).unwrap_or(0);
    }

    // Redistribute surrendered slots, one at a time, to the bucket with the
    // most spare candidates remaining.
    while missing > 0 {
        let donor = kinds
            .iter()
            .map(|kind| {
                let spare = buckets.get(kind).map_or(0, Vec::len) - taken.get(kind).copied().unwrap_or(0);
                (*kind, spare)
            })
            .filter(|(_, spare)| *spare > 0)
            .max_by_key(|(_, spare)| *spare);
        let Some((kind, _)) = donor else { break };
        if let Some(count) = taken.get_mut(&kind) {
            *count += 1;
        }
        missing -= 1;
    }

    let mut queues: HashMap<QuestionType, VecDeque<&Question>> = kinds
        .iter()
        .map(|kind| {
            let take = taken.get(kind).copied().unwrap_or(0);
            let queue = buckets
                .get(kind)
                .map_or_else(VecDeque::new, |bucket| bucket.iter().take(take).copied().collect());
            (*kind, queue)
        })
        .collect();

    let mut by_type: Vec<TypeSelection> = kinds
        .iter()
        .map(|kind| {
            let mut by_mastery: BTreeMap<u32, u32> = BTreeMap::new();
            let mut selected = 0_u32;
            if let Some(queue) = queues.get(kind) {
                for question in queue {
                    *by_mastery.entry(question.mastery()).or_insert(0) += 1;
                    selected += 1;
                }
            }
            TypeSelection {
                kind: *kind,
                selected,
                by_mastery,
            }
        })
        .collect();
    by_type.retain(|s| s.selected > 0 || !ratio.is_uniform());

    // Round-robin across type buckets so the output never runs
    // block-by-block through a single type.
    let mut question_ids = Vec::new();
    loop {
        let mut emitted = false;
        for kind in &kinds {
            if let Some(question) = queues.get_mut(kind).and_then(VecDeque::pop_front) {
                question_ids.push(question.id());
                emitted = true;
            }
        }
        if !emitted {
            break;
        }
    }

    let selected_total = u32::try_from(question_ids.len()).unwrap_or(u32::MAX);
    SampleOutcome {
        question_ids,
        shortfall: target_count.saturating_sub(selected_total),
        by_type,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
