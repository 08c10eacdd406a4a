//! Group building: candidate loading, sampling, and exclusion handling.

use std::collections::HashSet;

use practice_core::model::{PracticeSettings, QuestionId};
use practice_core::sampler::{self, SampleOutcome};
use storage::repository::QuestionRepository;

use crate::error::PracticeError;

/// Loads candidates for the settings' banks and runs the ratio sampler.
///
/// # Errors
///
/// Returns `PracticeError::EmptyPool` when the banks hold no usable
/// questions at all. A *short* sample is not an error — the outcome's
/// `shortfall` carries the `PoolExhausted` condition.
pub(crate) async fn sample_group(
    questions: &dyn QuestionRepository,
    settings: &PracticeSettings,
    exclude: &HashSet<QuestionId>,
) -> Result<SampleOutcome, PracticeError> {
    let pool = questions
        .list_candidates(settings.bank_ids(), None, true)
        .await?;
    if pool.is_empty() {
        return Err(PracticeError::EmptyPool);
    }
    Ok(sampler::sample(
        &pool,
        settings.type_ratio(),
        settings.target_count(),
        exclude,
    ))
}

/// Samples the next round's group, recycling the pool when the session has
/// already seen every candidate.
///
/// Returns the outcome and whether the exclusion set was abandoned (the
/// caller must clear the session's used-id set in that case).
///
/// # Errors
///
/// Returns `PracticeError::EmptyPool` when not even an unconstrained sample
/// yields a question.
pub(crate) async fn sample_next_round(
    questions: &dyn QuestionRepository,
    settings: &PracticeSettings,
    used: &HashSet<QuestionId>,
) -> Result<(SampleOutcome, bool), PracticeError> {
    let outcome = sample_group(questions, settings, used).await?;
    if !outcome.question_ids.is_empty() {
        return Ok((outcome, false));
    }

    // Every candidate has been seen this session: start recycling.
    log::debug!("exclusion set exhausted the pool; recycling seen questions");
    let outcome = sample_group(questions, settings, &HashSet::new()).await?;
    if outcome.question_ids.is_empty() {
        return Err(PracticeError::EmptyPool);
    }
    Ok((outcome, true))
}
