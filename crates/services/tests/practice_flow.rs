use std::sync::Arc;

use practice_core::Clock;
use practice_core::model::{
    BankId, ChoiceOption, GroupEpoch, GroupMode, PracticeSettings, Question, QuestionId,
    QuestionType, SessionStatus, TypeRatio, UserId,
};
use practice_core::time::fixed_now;
use services::{PracticeError, PracticeService, ReportPolicy};
use storage::repository::{
    InMemoryRepository, IssueRepository, PracticeStorage, QuestionRepository, SettingsRepository,
};

fn storage_around(repo: &InMemoryRepository) -> PracticeStorage {
    PracticeStorage {
        questions: Arc::new(repo.clone()),
        sessions: Arc::new(repo.clone()),
        answers: Arc::new(repo.clone()),
        settings: Arc::new(repo.clone()),
        issues: Arc::new(repo.clone()),
    }
}

fn single_choice(id: u64) -> Question {
    Question::new(
        QuestionId::new(id),
        BankId::new(1),
        QuestionType::SingleChoice,
        format!("Q{id}"),
        vec![ChoiceOption::new("A", "right"), ChoiceOption::new("B", "wrong")],
        "A",
        fixed_now(),
    )
    .unwrap()
}

fn settings(target: u32) -> PracticeSettings {
    PracticeSettings::new(
        vec![BankId::new(1)],
        TypeRatio::new(100, 0, 0, 0).unwrap(),
        target,
        true,
    )
    .unwrap()
}

async fn seed(repo: &InMemoryRepository, user: u64, question_count: u64, target: u32) {
    for id in 1..=question_count {
        repo.upsert_question(&single_choice(id)).await.unwrap();
    }
    repo.save_settings(UserId::new(user), &settings(target))
        .await
        .unwrap();
}

fn service(repo: &InMemoryRepository) -> PracticeService {
    PracticeService::new(Clock::fixed(fixed_now()), storage_around(repo))
}

#[tokio::test]
async fn round_transition_scenario() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 3, 3).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    assert!(!snapshot.resumed);
    assert_eq!(snapshot.status, SessionStatus::Normal);
    assert_eq!(snapshot.round, 1);
    assert_eq!(snapshot.group.total, 3);
    assert_eq!(snapshot.group.shortfall, 0);

    let session_id = snapshot.session_id;
    let epoch = snapshot.group.epoch;
    let ids: Vec<QuestionId> = snapshot.group.questions.iter().map(|q| q.id).collect();

    // Question 1 correct, question 2 wrong, question 3 correct.
    let first = svc.submit_answer(session_id, ids[0], epoch, "A").await.unwrap();
    assert!(first.is_correct);
    assert!(first.counted_this_call);
    assert_eq!(first.mastery, 1);

    let second = svc.submit_answer(session_id, ids[1], epoch, "B").await.unwrap();
    assert!(!second.is_correct);
    assert!(second.counted_this_call);
    assert_eq!(second.mastery, 0);

    svc.submit_answer(session_id, ids[2], epoch, "A").await.unwrap();

    // Completion must enter reinforcement over exactly the wrong question.
    let reinforce = svc.complete_group(session_id).await.unwrap();
    assert_eq!(reinforce.mode, GroupMode::Reinforce);
    assert_eq!(reinforce.status, SessionStatus::Reinforcing);
    assert_eq!(reinforce.round, 1);
    assert_eq!(reinforce.total, 1);
    assert_eq!(reinforce.questions[0].id, ids[1]);
    assert!(reinforce.epoch > epoch);

    // A correct reinforcement pass returns to normal with round 2.
    let fixed = svc
        .submit_answer(session_id, ids[1], reinforce.epoch, "A")
        .await
        .unwrap();
    assert!(fixed.is_correct);
    assert!(fixed.counted_this_call);

    let next = svc.complete_group(session_id).await.unwrap();
    assert_eq!(next.mode, GroupMode::Normal);
    assert_eq!(next.status, SessionStatus::Normal);
    assert_eq!(next.round, 2);
    assert!(next.epoch > reinforce.epoch);
    assert_eq!(next.total, 3);
}

#[tokio::test]
async fn counter_follows_monotonic_reset_law() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 1, 1).await;
    // Give the question an existing streak.
    let mut question = single_choice(1);
    question.record_correct();
    question.record_correct();
    question.record_correct();
    repo.upsert_question(&question).await.unwrap();

    let svc = service(&repo);
    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();

    let outcome = svc
        .submit_answer(snapshot.session_id, QuestionId::new(1), snapshot.group.epoch, "B")
        .await
        .unwrap();

    // A counted-wrong answer sets the counter to exactly zero.
    assert!(!outcome.is_correct);
    assert_eq!(outcome.mastery, 0);
    assert_eq!(repo.get_question(QuestionId::new(1)).await.unwrap().mastery(), 0);
}

#[tokio::test]
async fn resubmission_is_idempotent_for_the_counter() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 1, 1).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let session_id = snapshot.session_id;
    let epoch = snapshot.group.epoch;
    let question = QuestionId::new(1);

    let first = svc.submit_answer(session_id, question, epoch, "A").await.unwrap();
    assert!(first.counted_this_call);
    assert_eq!(repo.get_question(question).await.unwrap().mastery(), 1);

    // The verdict updates both times, but the counter moves only once.
    let second = svc.submit_answer(session_id, question, epoch, "B").await.unwrap();
    assert!(!second.is_correct);
    assert!(!second.counted_this_call);
    assert_eq!(repo.get_question(question).await.unwrap().mastery(), 1);

    let third = svc.submit_answer(session_id, question, epoch, "A").await.unwrap();
    assert!(third.is_correct);
    assert!(!third.counted_this_call);
    assert_eq!(repo.get_question(question).await.unwrap().mastery(), 1);
}

#[tokio::test]
async fn stale_epoch_is_rejected_without_mutation() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 2, 2).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let session_id = snapshot.session_id;
    let question = snapshot.group.questions[0].id;

    let err = svc
        .submit_answer(session_id, question, GroupEpoch::new(99), "A")
        .await
        .unwrap_err();
    assert!(matches!(err, PracticeError::StaleGroup { .. }));
    assert_eq!(repo.get_question(question).await.unwrap().mastery(), 0);

    // An epoch from a superseded group fails the same way.
    let old_epoch = snapshot.group.epoch;
    for q in &snapshot.group.questions {
        svc.submit_answer(session_id, q.id, old_epoch, "A").await.unwrap();
    }
    let next = svc.complete_group(session_id).await.unwrap();
    assert!(next.epoch > old_epoch);

    let err = svc
        .submit_answer(session_id, next.questions[0].id, old_epoch, "A")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PracticeError::StaleGroup { submitted, current }
            if submitted == old_epoch && current == next.epoch
    ));
}

#[tokio::test]
async fn exhausted_pool_starts_with_a_short_group() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 2, 5).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();

    assert_eq!(snapshot.group.total, 2);
    assert_eq!(snapshot.group.shortfall, 3);
}

#[tokio::test]
async fn second_start_resumes_the_existing_session() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 3, 3).await;
    let svc = service(&repo);

    let first = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let second = svc.start_or_resume(UserId::new(1)).await.unwrap();

    assert!(second.resumed);
    assert_eq!(first.session_id, second.session_id);
    assert_eq!(first.group.epoch, second.group.epoch);
}

#[tokio::test]
async fn start_without_settings_fails_cleanly() {
    let repo = InMemoryRepository::new();
    let svc = service(&repo);

    let err = svc.start_or_resume(UserId::new(1)).await.unwrap_err();
    assert!(matches!(err, PracticeError::NoActiveSettings));
}

#[tokio::test]
async fn completing_with_unanswered_questions_is_refused() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 3, 3).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    svc.submit_answer(
        snapshot.session_id,
        snapshot.group.questions[0].id,
        snapshot.group.epoch,
        "A",
    )
    .await
    .unwrap();

    let err = svc.complete_group(snapshot.session_id).await.unwrap_err();
    assert!(matches!(
        err,
        PracticeError::GroupIncomplete { ref missing } if missing.len() == 2
    ));
}

#[tokio::test]
async fn answers_outside_the_group_are_refused() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 2, 2).await;
    // A question from a bank outside the configured set.
    let stray = Question::new(
        QuestionId::new(50),
        BankId::new(2),
        QuestionType::SingleChoice,
        "Q50",
        vec![ChoiceOption::new("A", "right"), ChoiceOption::new("B", "wrong")],
        "A",
        fixed_now(),
    )
    .unwrap();
    repo.upsert_question(&stray).await.unwrap();
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let err = svc
        .submit_answer(snapshot.session_id, QuestionId::new(50), snapshot.group.epoch, "A")
        .await
        .unwrap_err();
    assert!(matches!(err, PracticeError::QuestionNotInGroup(_)));
}

#[tokio::test]
async fn reset_discards_the_session_but_keeps_counters() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 2, 2).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let question = snapshot.group.questions[0].id;
    svc.submit_answer(snapshot.session_id, question, snapshot.group.epoch, "A")
        .await
        .unwrap();
    assert_eq!(repo.get_question(question).await.unwrap().mastery(), 1);

    svc.reset_session(snapshot.session_id).await.unwrap();

    assert!(matches!(
        svc.current_group(snapshot.session_id).await.unwrap_err(),
        PracticeError::SessionNotFound
    ));
    // Committed mastery survives the reset.
    assert_eq!(repo.get_question(question).await.unwrap().mastery(), 1);

    // Starting again builds a brand-new session.
    let fresh = svc.start_or_resume(UserId::new(1)).await.unwrap();
    assert!(!fresh.resumed);
    assert_ne!(fresh.session_id, snapshot.session_id);
}

#[tokio::test]
async fn finish_is_terminal_and_explicit() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 2, 2).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    svc.finish_session(snapshot.session_id).await.unwrap();

    let err = svc
        .submit_answer(
            snapshot.session_id,
            snapshot.group.questions[0].id,
            snapshot.group.epoch,
            "A",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PracticeError::SessionCompleted));

    // A finished session no longer blocks a fresh start.
    let fresh = svc.start_or_resume(UserId::new(1)).await.unwrap();
    assert!(!fresh.resumed);
}

#[tokio::test]
async fn report_and_skip_unblocks_completion_and_excludes_the_question() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 3, 3).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let session_id = snapshot.session_id;
    let epoch = snapshot.group.epoch;
    let ids: Vec<QuestionId> = snapshot.group.questions.iter().map(|q| q.id).collect();

    svc.submit_answer(session_id, ids[0], epoch, "A").await.unwrap();
    svc.submit_answer(session_id, ids[1], epoch, "A").await.unwrap();
    svc.report_and_skip(session_id, ids[2], "two correct options").await.unwrap();

    // The forced entry counts as correct, so completion advances the round.
    let next = svc.complete_group(session_id).await.unwrap();
    assert_eq!(next.mode, GroupMode::Normal);
    assert_eq!(next.round, 2);

    // The reported question is out of the sampling pool from now on.
    assert!(next.questions.iter().all(|q| q.id != ids[2]));
    assert!(repo.get_question(ids[2]).await.unwrap().is_reported());

    let issues = repo.list_issues().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].question_id, ids[2]);
    assert_eq!(issues[0].reason, "two correct options");

    // Default policy: the forced entry increments mastery.
    assert_eq!(repo.get_question(ids[2]).await.unwrap().mastery(), 1);
}

#[tokio::test]
async fn exclude_policy_reports_without_touching_the_counter() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 2, 2).await;
    let svc = service(&repo).with_report_policy(ReportPolicy::ExcludeFromCounter);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let question = snapshot.group.questions[0].id;

    svc.report_and_skip(snapshot.session_id, question, "typo in options")
        .await
        .unwrap();

    assert_eq!(repo.get_question(question).await.unwrap().mastery(), 0);
    assert!(repo.get_question(question).await.unwrap().is_reported());
}

#[tokio::test]
async fn next_round_avoids_questions_already_seen() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 4, 2).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let session_id = snapshot.session_id;
    let first_round: Vec<QuestionId> = snapshot.group.questions.iter().map(|q| q.id).collect();

    for q in &snapshot.group.questions {
        svc.submit_answer(session_id, q.id, snapshot.group.epoch, "A")
            .await
            .unwrap();
    }
    let second = svc.complete_group(session_id).await.unwrap();

    assert_eq!(second.round, 2);
    assert_eq!(second.total, 2);
    for q in &second.questions {
        assert!(
            !first_round.contains(&q.id),
            "round 2 must not repeat a question from round 1 while unseen ones remain"
        );
    }
}

#[tokio::test]
async fn clean_rounds_recycle_the_pool_once_it_is_exhausted() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 2, 2).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    let session_id = snapshot.session_id;

    // Round 1 consumes both pool questions; a clean completion must still
    // produce a full round-2 group by recycling the seen set.
    for q in &snapshot.group.questions {
        svc.submit_answer(session_id, q.id, snapshot.group.epoch, "A")
            .await
            .unwrap();
    }
    let second = svc.complete_group(session_id).await.unwrap();
    assert_eq!(second.round, 2);
    assert_eq!(second.total, 2);

    for q in &second.questions {
        svc.submit_answer(session_id, q.id, second.epoch, "A").await.unwrap();
    }
    let third = svc.complete_group(session_id).await.unwrap();
    assert_eq!(third.round, 3);
    assert_eq!(third.total, 2);
}

#[tokio::test]
async fn status_snapshot_reports_progress_and_distribution() {
    let repo = InMemoryRepository::new();
    seed(&repo, 1, 3, 3).await;
    let svc = service(&repo);

    let snapshot = svc.start_or_resume(UserId::new(1)).await.unwrap();
    svc.submit_answer(
        snapshot.session_id,
        snapshot.group.questions[0].id,
        snapshot.group.epoch,
        "A",
    )
    .await
    .unwrap();
    svc.submit_answer(
        snapshot.session_id,
        snapshot.group.questions[1].id,
        snapshot.group.epoch,
        "B",
    )
    .await
    .unwrap();

    let status = svc.status_snapshot(UserId::new(1)).await.unwrap();
    let session = status.session.expect("active session");
    assert_eq!(session.session_id, snapshot.session_id);
    assert_eq!(session.group_total, 3);
    assert_eq!(session.answered, 2);
    assert_eq!(session.correct, 1);
    assert_eq!(session.wrong, 1);
    assert_eq!(session.pending, 1);

    // One question at streak 1, two still at 0.
    assert_eq!(status.mastery_distribution.get(&0), Some(&2));
    assert_eq!(status.mastery_distribution.get(&1), Some(&1));
    assert_eq!(status.per_bank.len(), 1);
    assert_eq!(status.per_bank[0].bank_id, BankId::new(1));
    assert_eq!(status.per_bank[0].lowest_count_remaining, 2);
}
