use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use practice_core::Clock;
use practice_core::grading;
use practice_core::model::{
    AnswerKey, AnswerRecord, BankId, GroupEpoch, PracticeSession, PracticeSettings, QuestionId,
    SessionId, UserId,
};
use practice_core::rounds::{self, RoundTransition};
use practice_core::sampler::TypeSelection;
use storage::repository::{CounterMutation, PracticeStorage, StorageError};

use super::builder;
use super::ledger;
use super::view::{
    ActiveSessionStatus, AnswerOutcome, BankStats, GroupSnapshot, QuestionView, SessionSnapshot,
    StatusSnapshot,
};
use crate::error::PracticeError;

//
// ─── REPORT POLICY ─────────────────────────────────────────────────────────────
//

/// How a feedback-and-skip entry treats the mastery counter.
///
/// Both policies record a counted-correct ledger entry so the group can
/// complete; they differ only in whether the counter moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportPolicy {
    /// The forced entry counts as a correct answer and increments mastery.
    #[default]
    ForcedCorrect,
    /// Ledger-only: the counter is left untouched.
    ExcludeFromCounter,
}

//
// ─── SESSION LOCKS ─────────────────────────────────────────────────────────────
//

/// Per-session mutex table: operations within one session are serialized,
/// different sessions proceed in parallel.
#[derive(Default)]
struct SessionLocks {
    inner: StdMutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    fn acquire(&self, id: SessionId) -> Arc<AsyncMutex<()>> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.entry(id).or_default().clone()
    }

    fn discard(&self, id: SessionId) {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(&id);
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Orchestrates the smart-practice scheduler: session store, group builder,
/// and answer ledger.
#[derive(Clone)]
pub struct PracticeService {
    clock: Clock,
    storage: PracticeStorage,
    report_policy: ReportPolicy,
    locks: Arc<SessionLocks>,
}

impl PracticeService {
    #[must_use]
    pub fn new(clock: Clock, storage: PracticeStorage) -> Self {
        Self {
            clock,
            storage,
            report_policy: ReportPolicy::default(),
            locks: Arc::new(SessionLocks::default()),
        }
    }

    #[must_use]
    pub fn with_report_policy(mut self, policy: ReportPolicy) -> Self {
        self.report_policy = policy;
        self
    }

    /// Persist validated settings for the user, replacing earlier ones.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` on persistence failures.
    pub async fn save_settings(
        &self,
        user_id: UserId,
        settings: PracticeSettings,
    ) -> Result<(), PracticeError> {
        self.storage.settings.save_settings(user_id, &settings).await?;
        Ok(())
    }

    /// Get-or-create: returns the user's existing non-completed session, or
    /// starts a fresh one from the latest saved settings.
    ///
    /// Resuming instead of erroring on a second start call is what lets
    /// clients reload mid-question without losing the session.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NoActiveSettings` if the user never saved a
    /// configuration, or `PracticeError::EmptyPool` if the selected banks
    /// hold no usable questions.
    pub async fn start_or_resume(&self, user_id: UserId) -> Result<SessionSnapshot, PracticeError> {
        if let Some(existing) = self.storage.sessions.active_session(user_id).await? {
            log::debug!("resuming session {} for user {user_id}", existing.id());
            return self.session_snapshot(&existing, true, 0, Vec::new()).await;
        }

        let settings = self
            .storage
            .settings
            .latest_settings(user_id)
            .await?
            .ok_or(PracticeError::NoActiveSettings)?;

        let outcome =
            builder::sample_group(self.storage.questions.as_ref(), &settings, &HashSet::new())
                .await?;
        if outcome.question_ids.is_empty() {
            return Err(PracticeError::EmptyPool);
        }

        let now = self.clock.now();
        let session = PracticeSession::start(
            SessionId::generate(),
            user_id,
            settings,
            outcome.question_ids.clone(),
            now,
        )?;

        match self.storage.sessions.save_session(&session).await {
            Ok(()) => {}
            // Lost a start race: another call created the session first.
            Err(StorageError::Conflict) => {
                if let Some(existing) = self.storage.sessions.active_session(user_id).await? {
                    return self.session_snapshot(&existing, true, 0, Vec::new()).await;
                }
                return Err(PracticeError::Storage(StorageError::Conflict));
            }
            Err(e) => return Err(e.into()),
        }

        log::info!(
            "started session {} for user {user_id}: {} questions, shortfall {}",
            session.id(),
            session.current_group().len(),
            outcome.shortfall
        );
        self.session_snapshot(&session, false, outcome.shortfall, outcome.by_type)
            .await
    }

    /// The session's current group with per-question ledger state.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::SessionNotFound` for an unknown id.
    pub async fn current_group(&self, session_id: SessionId) -> Result<GroupSnapshot, PracticeError> {
        let session = self.load_session(session_id).await?;
        self.group_snapshot(&session, 0, Vec::new()).await
    }

    /// Records one answer against the current group.
    ///
    /// The first submission for a (session, question, epoch) key mutates the
    /// mastery counter exactly once — increment on correct, reset on wrong —
    /// atomically with the entry's `counted` flag. Re-submissions recompute
    /// the verdict for feedback but never mutate again.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::StaleGroup` when `epoch` is not the current
    /// group's epoch (refetch and resubmit), `PracticeError::QuestionNotInGroup`
    /// for a question outside the group, or `PracticeError::SessionCompleted`
    /// on a finished session. No mutation happens in any error case.
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        epoch: GroupEpoch,
        value: &str,
    ) -> Result<AnswerOutcome, PracticeError> {
        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        if session.is_completed() {
            return Err(PracticeError::SessionCompleted);
        }

        let group = session.current_group();
        if epoch != group.epoch() {
            return Err(PracticeError::StaleGroup {
                submitted: epoch,
                current: group.epoch(),
            });
        }
        let Some(position) = group.position_of(question_id) else {
            return Err(PracticeError::QuestionNotInGroup(question_id));
        };

        let question = self.storage.questions.get_question(question_id).await?;
        let correct = grading::is_correct(value, question.standard_answer(), question.kind());
        let now = self.clock.now();

        let key = AnswerKey::new(session_id, question_id, epoch);
        let existing = self.storage.answers.get_answer(&key).await?;
        let decision = ledger::decide(key, existing, value, correct, now);

        if decision.counted_this_call {
            self.storage
                .answers
                .commit_counted(&decision.record, decision.mutation)
                .await?;
            log::debug!(
                "counted answer for question {question_id} in session {session_id}: correct={correct}"
            );
        } else {
            self.storage.answers.put_answer(&decision.record).await?;
        }

        session.note_position(position + 1, now);
        self.storage.sessions.save_session(&session).await?;

        let mastery = if decision.counted_this_call {
            match decision.mutation {
                CounterMutation::Increment => question.mastery().saturating_add(1),
                CounterMutation::Reset => 0,
                CounterMutation::None => question.mastery(),
            }
        } else {
            question.mastery()
        };

        Ok(AnswerOutcome {
            is_correct: correct,
            counted_this_call: decision.counted_this_call,
            mastery,
            standard_answer: session
                .settings()
                .realtime_analysis()
                .then(|| question.standard_answer().to_owned()),
        })
    }

    /// Evaluates the finished group and builds the next one.
    ///
    /// A group with wrong answers is followed by a reinforcement pass over
    /// exactly the wrong subset (round unchanged); a clean group opens the
    /// next round with a fresh ratio sample. The session never completes
    /// here — only `finish_session`/`reset_session` are terminal.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::GroupIncomplete` while any group question
    /// lacks a ledger entry for the current epoch.
    pub async fn complete_group(
        &self,
        session_id: SessionId,
    ) -> Result<GroupSnapshot, PracticeError> {
        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        if session.is_completed() {
            return Err(PracticeError::SessionCompleted);
        }

        let group = session.current_group().clone();
        let answers = self
            .storage
            .answers
            .answers_for_epoch(session_id, group.epoch())
            .await?;
        let by_id: HashMap<QuestionId, AnswerRecord> = answers
            .into_iter()
            .map(|record| (record.key().question_id, record))
            .collect();

        let mut outcomes = Vec::with_capacity(group.len());
        let mut missing = Vec::new();
        for id in group.question_ids() {
            match by_id.get(id) {
                Some(record) => outcomes.push((*id, record.is_correct())),
                None => missing.push(*id),
            }
        }
        if !missing.is_empty() {
            return Err(PracticeError::GroupIncomplete { missing });
        }

        let now = self.clock.now();
        match rounds::evaluate(&outcomes) {
            RoundTransition::Reinforce { wrong } => {
                log::debug!(
                    "session {session_id}: {} wrong answer(s), entering reinforcement",
                    wrong.len()
                );
                session.begin_reinforce_group(wrong, now)?;
                self.storage.sessions.save_session(&session).await?;
                self.group_snapshot(&session, 0, Vec::new()).await
            }
            RoundTransition::NextRound => {
                let settings = session.settings().clone();
                let (outcome, recycled) = builder::sample_next_round(
                    self.storage.questions.as_ref(),
                    &settings,
                    session.used_question_ids(),
                )
                .await?;
                if recycled {
                    session.clear_used_questions();
                }
                session.begin_next_round_group(outcome.question_ids.clone(), now)?;
                self.storage.sessions.save_session(&session).await?;
                log::info!(
                    "session {session_id}: round {} begins with {} questions",
                    session.round(),
                    session.current_group().len()
                );
                self.group_snapshot(&session, outcome.shortfall, outcome.by_type)
                    .await
            }
        }
    }

    /// Reports a question as defective and skips it.
    ///
    /// Writes the issue to the side channel, excludes the question from
    /// future sampling, and records a forced counted-correct ledger entry so
    /// the group can still complete. The configured `ReportPolicy` decides
    /// whether the forced entry also increments mastery.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::QuestionNotInGroup` for a question outside
    /// the current group.
    pub async fn report_and_skip(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        reason: &str,
    ) -> Result<(), PracticeError> {
        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        if session.is_completed() {
            return Err(PracticeError::SessionCompleted);
        }
        let group = session.current_group();
        let Some(position) = group.position_of(question_id) else {
            return Err(PracticeError::QuestionNotInGroup(question_id));
        };
        let epoch = group.epoch();

        let now = self.clock.now();
        self.storage
            .issues
            .report_issue(question_id, reason, now)
            .await?;
        self.storage.questions.mark_reported(question_id).await?;
        log::info!("question {question_id} reported in session {session_id}: {reason}");

        let key = AnswerKey::new(session_id, question_id, epoch);
        let already_counted = self
            .storage
            .answers
            .get_answer(&key)
            .await?
            .is_some_and(|record| record.is_counted());

        let record = AnswerRecord::new(key, "reported", true, true, now);
        let mutation = match (self.report_policy, already_counted) {
            (_, true) | (ReportPolicy::ExcludeFromCounter, false) => CounterMutation::None,
            (ReportPolicy::ForcedCorrect, false) => CounterMutation::Increment,
        };
        self.storage.answers.commit_counted(&record, mutation).await?;

        session.note_position(position + 1, now);
        self.storage.sessions.save_session(&session).await?;
        Ok(())
    }

    /// Explicit terminal transition.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::SessionNotFound` for an unknown id.
    pub async fn finish_session(&self, session_id: SessionId) -> Result<(), PracticeError> {
        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        if !session.is_completed() {
            session.mark_completed(self.clock.now());
            self.storage.sessions.save_session(&session).await?;
            log::info!("session {session_id} finished in round {}", session.round());
        }
        drop(_guard);
        self.locks.discard(session_id);
        Ok(())
    }

    /// Destructive reset: discards the session and its ledger entries.
    ///
    /// Mastery counters already committed stay untouched — they are global
    /// state, not session state.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::SessionNotFound` for an unknown id.
    pub async fn reset_session(&self, session_id: SessionId) -> Result<(), PracticeError> {
        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().await;

        // Surface a clean error before deleting anything.
        let _ = self.load_session(session_id).await?;

        self.storage.answers.delete_for_session(session_id).await?;
        self.storage.sessions.delete_session(session_id).await?;
        log::info!("session {session_id} reset");

        drop(_guard);
        self.locks.discard(session_id);
        Ok(())
    }

    /// Read-only dashboard aggregates; never mutates state.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` on backend failures.
    pub async fn status_snapshot(&self, user_id: UserId) -> Result<StatusSnapshot, PracticeError> {
        let active = self.storage.sessions.active_session(user_id).await?;

        let session = match &active {
            Some(session) => {
                let group = session.current_group();
                let answers = self
                    .storage
                    .answers
                    .answers_for_epoch(session.id(), group.epoch())
                    .await?;
                let by_id: HashMap<QuestionId, AnswerRecord> = answers
                    .into_iter()
                    .map(|record| (record.key().question_id, record))
                    .collect();

                let mut answered = 0_usize;
                let mut correct = 0_usize;
                let mut wrong = 0_usize;
                for id in group.question_ids() {
                    if let Some(record) = by_id.get(id) {
                        answered += 1;
                        if record.is_correct() {
                            correct += 1;
                        } else {
                            wrong += 1;
                        }
                    }
                }

                Some(ActiveSessionStatus {
                    session_id: session.id(),
                    status: session.status(),
                    round: session.round(),
                    epoch: group.epoch(),
                    group_total: group.len(),
                    answered,
                    correct,
                    wrong,
                    pending: group.len() - answered,
                })
            }
            None => None,
        };

        let bank_ids: Vec<BankId> = match &active {
            Some(session) => session.settings().bank_ids().to_vec(),
            None => self
                .storage
                .settings
                .latest_settings(user_id)
                .await?
                .map(|s| s.bank_ids().to_vec())
                .unwrap_or_default(),
        };

        let mastery_distribution = if bank_ids.is_empty() {
            BTreeMap::new()
        } else {
            self.storage.questions.mastery_distribution(&bank_ids).await?
        };

        let mut per_bank = Vec::with_capacity(bank_ids.len());
        for bank_id in &bank_ids {
            let distribution = self
                .storage
                .questions
                .mastery_distribution(std::slice::from_ref(bank_id))
                .await?;
            let lowest_count_remaining = distribution.get(&0).copied().unwrap_or(0);
            per_bank.push(BankStats {
                bank_id: *bank_id,
                distribution,
                lowest_count_remaining,
            });
        }

        Ok(StatusSnapshot {
            session,
            mastery_distribution,
            per_bank,
        })
    }

    //
    // ─── INTERNAL ──────────────────────────────────────────────────────────────
    //

    async fn load_session(&self, id: SessionId) -> Result<PracticeSession, PracticeError> {
        match self.storage.sessions.get_session(id).await {
            Ok(session) => Ok(session),
            Err(StorageError::NotFound) => Err(PracticeError::SessionNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn session_snapshot(
        &self,
        session: &PracticeSession,
        resumed: bool,
        shortfall: u32,
        selection: Vec<TypeSelection>,
    ) -> Result<SessionSnapshot, PracticeError> {
        let group = self.group_snapshot(session, shortfall, selection).await?;
        Ok(SessionSnapshot {
            session_id: session.id(),
            status: session.status(),
            round: session.round(),
            realtime_analysis: session.settings().realtime_analysis(),
            resumed,
            group,
        })
    }

    async fn group_snapshot(
        &self,
        session: &PracticeSession,
        shortfall: u32,
        selection: Vec<TypeSelection>,
    ) -> Result<GroupSnapshot, PracticeError> {
        let group = session.current_group();
        let questions = self
            .storage
            .questions
            .get_questions(group.question_ids())
            .await?;
        let answers = self
            .storage
            .answers
            .answers_for_epoch(session.id(), group.epoch())
            .await?;
        let by_id: HashMap<QuestionId, AnswerRecord> = answers
            .into_iter()
            .map(|record| (record.key().question_id, record))
            .collect();

        let realtime = session.settings().realtime_analysis();
        let questions = questions
            .into_iter()
            .map(|question| {
                let answer = by_id.get(&question.id());
                QuestionView {
                    id: question.id(),
                    kind: question.kind(),
                    content: question.content().to_owned(),
                    options: question.options().to_vec(),
                    mastery: question.mastery(),
                    favorite: question.is_favorite(),
                    submitted: answer.map(|a| a.submitted().to_owned()),
                    is_correct: answer.map(AnswerRecord::is_correct),
                    counted: answer.map(AnswerRecord::is_counted),
                    standard_answer: realtime.then(|| question.standard_answer().to_owned()),
                }
            })
            .collect();

        Ok(GroupSnapshot {
            session_id: session.id(),
            epoch: group.epoch(),
            mode: group.mode(),
            status: session.status(),
            round: session.round(),
            total: group.len(),
            current_index: group.current_index(),
            shortfall,
            selection,
            questions,
        })
    }
}
