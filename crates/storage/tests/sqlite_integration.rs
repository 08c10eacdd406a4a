use practice_core::model::{
    AnswerKey, AnswerRecord, BankId, ChoiceOption, GroupEpoch, PracticeSession, PracticeSettings,
    Question, QuestionId, QuestionType, SessionId, SessionStatus, TypeRatio, UserId,
};
use practice_core::time::fixed_now;
use storage::repository::{
    AnswerRepository, CounterMutation, IssueRepository, QuestionRepository, SessionRepository,
    SettingsRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_question(id: u64, bank: u64, kind: QuestionType, mastery: u32) -> Question {
    let options = if kind.has_options() {
        vec![ChoiceOption::new("A", "first"), ChoiceOption::new("B", "second")]
    } else {
        Vec::new()
    };
    Question::from_persisted(
        QuestionId::new(id),
        BankId::new(bank),
        kind,
        format!("Question {id}"),
        options,
        "A",
        mastery,
        false,
        false,
        fixed_now(),
    )
    .unwrap()
}

fn build_session(user: u64, question_ids: &[u64]) -> PracticeSession {
    let settings = PracticeSettings::new(
        vec![BankId::new(1)],
        TypeRatio::new(100, 0, 0, 0).unwrap(),
        5,
        true,
    )
    .unwrap();
    PracticeSession::start(
        SessionId::generate(),
        UserId::new(user),
        settings,
        question_ids.iter().copied().map(QuestionId::new).collect(),
        fixed_now(),
    )
    .unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_persists_questions_and_counters() {
    let repo = connect("memdb_questions").await;

    let question = build_question(1, 1, QuestionType::MultiChoice, 2);
    repo.upsert_question(&question).await.unwrap();

    let fetched = repo.get_question(QuestionId::new(1)).await.unwrap();
    assert_eq!(fetched.kind(), QuestionType::MultiChoice);
    assert_eq!(fetched.options().len(), 2);
    assert_eq!(fetched.mastery(), 2);

    repo.increment_mastery(QuestionId::new(1)).await.unwrap();
    assert_eq!(repo.get_question(QuestionId::new(1)).await.unwrap().mastery(), 3);

    repo.reset_mastery(QuestionId::new(1)).await.unwrap();
    assert_eq!(repo.get_question(QuestionId::new(1)).await.unwrap().mastery(), 0);

    let err = repo.increment_mastery(QuestionId::new(42)).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_candidates_and_distribution_respect_flags() {
    let repo = connect("memdb_candidates").await;

    repo.upsert_question(&build_question(1, 1, QuestionType::SingleChoice, 0))
        .await
        .unwrap();
    repo.upsert_question(&build_question(2, 1, QuestionType::SingleChoice, 3))
        .await
        .unwrap();
    repo.upsert_question(&build_question(3, 2, QuestionType::SingleChoice, 0))
        .await
        .unwrap();
    let mut reported = build_question(4, 1, QuestionType::SingleChoice, 0);
    reported.set_reported(true);
    repo.upsert_question(&reported).await.unwrap();

    let candidates = repo
        .list_candidates(&[BankId::new(1)], None, true)
        .await
        .unwrap();
    let ids: Vec<u64> = candidates.iter().map(|q| q.id().value()).collect();
    assert_eq!(ids, vec![1, 2]);

    let judgments = repo
        .list_candidates(&[BankId::new(1)], Some(QuestionType::Judgment), true)
        .await
        .unwrap();
    assert!(judgments.is_empty());

    let dist = repo.mastery_distribution(&[BankId::new(1)]).await.unwrap();
    assert_eq!(dist.get(&0), Some(&1));
    assert_eq!(dist.get(&3), Some(&1));
}

#[tokio::test]
async fn sqlite_session_roundtrip_keeps_group_and_epoch_state() {
    let repo = connect("memdb_sessions").await;

    let mut session = build_session(7, &[1, 2, 3]);
    repo.save_session(&session).await.unwrap();

    // Advance into a reinforcement group and persist again.
    session
        .begin_reinforce_group(vec![QuestionId::new(2)], fixed_now())
        .unwrap();
    session.note_position(1, fixed_now());
    repo.save_session(&session).await.unwrap();

    let loaded = repo.get_session(session.id()).await.unwrap();
    assert_eq!(loaded.status(), SessionStatus::Reinforcing);
    assert_eq!(loaded.round(), 1);
    assert_eq!(loaded.current_group().epoch(), GroupEpoch::new(2));
    assert_eq!(loaded.current_group().question_ids(), &[QuestionId::new(2)]);
    assert_eq!(loaded.current_group().current_index(), 1);
    assert_eq!(loaded.next_epoch(), GroupEpoch::new(3));
    assert_eq!(loaded.used_question_ids().len(), 3);

    let active = repo.active_session(UserId::new(7)).await.unwrap();
    assert_eq!(active.map(|s| s.id()), Some(session.id()));
}

#[tokio::test]
async fn sqlite_enforces_one_active_session_per_user() {
    let repo = connect("memdb_conflict").await;

    repo.save_session(&build_session(1, &[1])).await.unwrap();
    let err = repo.save_session(&build_session(1, &[2])).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    // Other users are unaffected.
    repo.save_session(&build_session(2, &[3])).await.unwrap();
}

#[tokio::test]
async fn sqlite_commit_counted_is_atomic_with_the_ledger() {
    let repo = connect("memdb_ledger").await;

    repo.upsert_question(&build_question(1, 1, QuestionType::SingleChoice, 4))
        .await
        .unwrap();
    let session = build_session(1, &[1]);
    repo.save_session(&session).await.unwrap();

    let key = AnswerKey::new(session.id(), QuestionId::new(1), GroupEpoch::new(1));
    let record = AnswerRecord::new(key, "B", false, true, fixed_now());
    repo.commit_counted(&record, CounterMutation::Reset).await.unwrap();

    assert_eq!(repo.get_question(QuestionId::new(1)).await.unwrap().mastery(), 0);
    let stored = repo.get_answer(&key).await.unwrap().unwrap();
    assert!(stored.is_counted());
    assert!(!stored.is_correct());

    // A mutation against a missing question must leave no ledger entry.
    let orphan_key = AnswerKey::new(session.id(), QuestionId::new(99), GroupEpoch::new(1));
    let orphan = AnswerRecord::new(orphan_key, "A", true, true, fixed_now());
    let err = repo
        .commit_counted(&orphan, CounterMutation::Increment)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    assert!(repo.get_answer(&orphan_key).await.unwrap().is_none());

    let answers = repo
        .answers_for_epoch(session.id(), GroupEpoch::new(1))
        .await
        .unwrap();
    assert_eq!(answers.len(), 1);
}

#[tokio::test]
async fn sqlite_delete_session_cascades_ledger_entries() {
    let repo = connect("memdb_cascade").await;

    repo.upsert_question(&build_question(1, 1, QuestionType::SingleChoice, 0))
        .await
        .unwrap();
    let session = build_session(3, &[1]);
    repo.save_session(&session).await.unwrap();

    let key = AnswerKey::new(session.id(), QuestionId::new(1), GroupEpoch::new(1));
    let record = AnswerRecord::new(key, "A", true, true, fixed_now());
    repo.commit_counted(&record, CounterMutation::Increment).await.unwrap();

    repo.delete_session(session.id()).await.unwrap();

    assert!(matches!(
        repo.get_session(session.id()).await.unwrap_err(),
        StorageError::NotFound
    ));
    assert!(repo.get_answer(&key).await.unwrap().is_none());
    // The committed counter survives the delete.
    assert_eq!(repo.get_question(QuestionId::new(1)).await.unwrap().mastery(), 1);
}

#[tokio::test]
async fn sqlite_settings_are_latest_wins() {
    let repo = connect("memdb_settings").await;

    assert!(repo.latest_settings(UserId::new(1)).await.unwrap().is_none());

    let first = PracticeSettings::new(
        vec![BankId::new(1)],
        TypeRatio::uniform(),
        10,
        true,
    )
    .unwrap();
    repo.save_settings(UserId::new(1), &first).await.unwrap();

    let second = PracticeSettings::new(
        vec![BankId::new(1), BankId::new(2)],
        TypeRatio::new(60, 20, 20, 0).unwrap(),
        20,
        false,
    )
    .unwrap();
    repo.save_settings(UserId::new(1), &second).await.unwrap();

    let loaded = repo.latest_settings(UserId::new(1)).await.unwrap().unwrap();
    assert_eq!(loaded, second);
}

#[tokio::test]
async fn sqlite_records_issue_reports() {
    let repo = connect("memdb_issues").await;

    repo.upsert_question(&build_question(1, 1, QuestionType::SingleChoice, 0))
        .await
        .unwrap();
    repo.report_issue(QuestionId::new(1), "ambiguous wording", fixed_now())
        .await
        .unwrap();

    let issues = repo.list_issues().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].question_id, QuestionId::new(1));
    assert_eq!(issues[0].reason, "ambiguous wording");
}
