use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use practice_core::model::{
    AnswerKey, AnswerRecord, BankId, GroupEpoch, PracticeSession, PracticeSettings, Question,
    QuestionId, QuestionType, SessionId, UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Effect of a counted answer on the per-question mastery counter.
///
/// The counter is the only cross-session shared mutable state in the
/// scheduler, so mutations go through the repository as single-row atomic
/// updates rather than read-modify-write in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMutation {
    /// Counted-correct: streak grows by exactly one.
    Increment,
    /// Counted-wrong: streak resets to zero, whatever its prior value.
    Reset,
    /// Ledger-only commit; the counter is left untouched.
    None,
}

/// A reported question issue, written by feedback-and-skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReport {
    pub question_id: QuestionId,
    pub reason: String,
    pub reported_at: DateTime<Utc>,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Read-mostly view over the question pool, scoped by bank ids.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist or update a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Fetch a single question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError>;

    /// Fetch questions by id, preserving the requested order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any are missing.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError>;

    /// List sampling candidates in the given banks, optionally restricted
    /// to one question type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_candidates(
        &self,
        bank_ids: &[BankId],
        kind: Option<QuestionType>,
        exclude_reported: bool,
    ) -> Result<Vec<Question>, StorageError>;

    /// Atomically bump the mastery counter by one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown question.
    async fn increment_mastery(&self, id: QuestionId) -> Result<(), StorageError>;

    /// Atomically reset the mastery counter to zero.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown question.
    async fn reset_mastery(&self, id: QuestionId) -> Result<(), StorageError>;

    /// Exclude the question from sampling until the flag is cleared.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown question.
    async fn mark_reported(&self, id: QuestionId) -> Result<(), StorageError>;

    /// Mastery-level histogram over non-reported questions in the banks.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn mastery_distribution(
        &self,
        bank_ids: &[BankId],
    ) -> Result<BTreeMap<u32, u64>, StorageError>;
}

/// Persistence for practice sessions and their current group.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist the session and its current group as one unit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a different non-completed session
    /// already exists for the same user (one active session per user).
    async fn save_session(&self, session: &PracticeSession) -> Result<(), StorageError>;

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_session(&self, id: SessionId) -> Result<PracticeSession, StorageError>;

    /// The user's newest non-completed session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<PracticeSession>, StorageError>;

    /// Remove a session together with its answer-ledger entries.
    ///
    /// Never touches mastery counters already committed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError>;
}

/// The answer ledger: one entry per (session, question, group epoch).
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Fetch the entry for a key, if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_answer(&self, key: &AnswerKey) -> Result<Option<AnswerRecord>, StorageError>;

    /// Insert or overwrite an entry without touching any counter.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn put_answer(&self, record: &AnswerRecord) -> Result<(), StorageError>;

    /// Write a counted entry and apply its counter mutation as ONE atomic
    /// step: either both land or neither does, so a failed mutation never
    /// leaves an entry marked counted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the mutated question is missing.
    async fn commit_counted(
        &self,
        record: &AnswerRecord,
        mutation: CounterMutation,
    ) -> Result<(), StorageError>;

    /// All entries recorded against one group epoch.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn answers_for_epoch(
        &self,
        session_id: SessionId,
        epoch: GroupEpoch,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Drop every entry belonging to the session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_for_session(&self, session_id: SessionId) -> Result<(), StorageError>;
}

/// Latest-wins practice settings per user.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Fetch the user's most recently saved settings.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn latest_settings(
        &self,
        user_id: UserId,
    ) -> Result<Option<PracticeSettings>, StorageError>;

    /// Persist new settings, replacing any previous ones.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn save_settings(
        &self,
        user_id: UserId,
        settings: &PracticeSettings,
    ) -> Result<(), StorageError>;
}

/// Side channel for question issue reports.
#[async_trait]
pub trait IssueRepository: Send + Sync {
    /// Append an issue report.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn report_issue(
        &self,
        question_id: QuestionId,
        reason: &str,
        reported_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// All reports, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_issues(&self) -> Result<Vec<IssueReport>, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct Inner {
    questions: HashMap<QuestionId, Question>,
    sessions: HashMap<SessionId, PracticeSession>,
    answers: HashMap<AnswerKey, AnswerRecord>,
    settings: HashMap<UserId, PracticeSettings>,
    issues: Vec<IssueReport>,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A single mutex guards the whole store, which also makes
/// `commit_counted` trivially atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.questions.insert(question.id(), question.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let guard = self.lock()?;
        guard.questions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match guard.questions.get(id) {
                Some(question) => found.push(question.clone()),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }

    async fn list_candidates(
        &self,
        bank_ids: &[BankId],
        kind: Option<QuestionType>,
        exclude_reported: bool,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let mut candidates: Vec<Question> = guard
            .questions
            .values()
            .filter(|q| bank_ids.contains(&q.bank_id()))
            .filter(|q| kind.is_none_or(|k| q.kind() == k))
            .filter(|q| !exclude_reported || !q.is_reported())
            .cloned()
            .collect();
        candidates.sort_by_key(Question::id);
        Ok(candidates)
    }

    async fn increment_mastery(&self, id: QuestionId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let question = guard.questions.get_mut(&id).ok_or(StorageError::NotFound)?;
        question.record_correct();
        Ok(())
    }

    async fn reset_mastery(&self, id: QuestionId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let question = guard.questions.get_mut(&id).ok_or(StorageError::NotFound)?;
        question.reset_mastery();
        Ok(())
    }

    async fn mark_reported(&self, id: QuestionId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let question = guard.questions.get_mut(&id).ok_or(StorageError::NotFound)?;
        question.set_reported(true);
        Ok(())
    }

    async fn mastery_distribution(
        &self,
        bank_ids: &[BankId],
    ) -> Result<BTreeMap<u32, u64>, StorageError> {
        let guard = self.lock()?;
        let mut buckets: BTreeMap<u32, u64> = BTreeMap::new();
        for question in guard.questions.values() {
            if bank_ids.contains(&question.bank_id()) && !question.is_reported() {
                *buckets.entry(question.mastery()).or_insert(0) += 1;
            }
        }
        Ok(buckets)
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn save_session(&self, session: &PracticeSession) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let clash = guard.sessions.values().any(|existing| {
            existing.user_id() == session.user_id()
                && existing.id() != session.id()
                && !existing.is_completed()
        });
        if clash && !session.is_completed() {
            return Err(StorageError::Conflict);
        }
        guard.sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<PracticeSession, StorageError> {
        let guard = self.lock()?;
        guard.sessions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<PracticeSession>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .sessions
            .values()
            .filter(|s| s.user_id() == user_id && !s.is_completed())
            .max_by_key(|s| s.created_at())
            .cloned())
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.sessions.remove(&id);
        guard.answers.retain(|key, _| key.session_id != id);
        Ok(())
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn get_answer(&self, key: &AnswerKey) -> Result<Option<AnswerRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.answers.get(key).cloned())
    }

    async fn put_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.answers.insert(record.key(), record.clone());
        Ok(())
    }

    async fn commit_counted(
        &self,
        record: &AnswerRecord,
        mutation: CounterMutation,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        // Mutate first: a missing question must fail before the ledger
        // entry lands, keeping flag and counter in step.
        match mutation {
            CounterMutation::Increment => {
                let question = guard
                    .questions
                    .get_mut(&record.key().question_id)
                    .ok_or(StorageError::NotFound)?;
                question.record_correct();
            }
            CounterMutation::Reset => {
                let question = guard
                    .questions
                    .get_mut(&record.key().question_id)
                    .ok_or(StorageError::NotFound)?;
                question.reset_mastery();
            }
            CounterMutation::None => {}
        }
        guard.answers.insert(record.key(), record.clone());
        Ok(())
    }

    async fn answers_for_epoch(
        &self,
        session_id: SessionId,
        epoch: GroupEpoch,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .answers
            .values()
            .filter(|a| a.key().session_id == session_id && a.key().epoch == epoch)
            .cloned()
            .collect())
    }

    async fn delete_for_session(&self, session_id: SessionId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.answers.retain(|key, _| key.session_id != session_id);
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryRepository {
    async fn latest_settings(
        &self,
        user_id: UserId,
    ) -> Result<Option<PracticeSettings>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.settings.get(&user_id).cloned())
    }

    async fn save_settings(
        &self,
        user_id: UserId,
        settings: &PracticeSettings,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.settings.insert(user_id, settings.clone());
        Ok(())
    }
}

#[async_trait]
impl IssueRepository for InMemoryRepository {
    async fn report_issue(
        &self,
        question_id: QuestionId,
        reason: &str,
        reported_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.issues.push(IssueReport {
            question_id,
            reason: reason.to_string(),
            reported_at,
        });
        Ok(())
    }

    async fn list_issues(&self) -> Result<Vec<IssueReport>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.issues.clone())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the scheduler's repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct PracticeStorage {
    pub questions: Arc<dyn QuestionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub issues: Arc<dyn IssueRepository>,
}

impl PracticeStorage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            questions: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            settings: Arc::new(repo.clone()),
            issues: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
