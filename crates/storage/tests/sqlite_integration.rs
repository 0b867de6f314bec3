use chrono::Duration;
use qbank_core::model::{
    Attempt, AttemptId, Choice, ChoiceId, ChoiceLabel, Difficulty, IdempotencyKey, PracticeMode,
    PracticeSession, Question, QuestionFilters, QuestionId, QuestionStatus, SessionId, TagSlug,
    UserId,
};
use qbank_core::time::fixed_now;
use storage::repository::{
    AttemptRepository, BookmarkRepository, IdempotencyRepository, QuestionRepository,
    SessionRepository,
};
use storage::sqlite::SqliteRepository;

fn build_question(id: u64, status: QuestionStatus, tag: &str, difficulty: Difficulty) -> Question {
    let choices = vec![
        Choice {
            id: ChoiceId::new(id * 10 + 1),
            label: ChoiceLabel::A,
            text: "right".into(),
            is_correct: true,
            explanation_md: Some("because".into()),
            sort_order: 0,
        },
        Choice {
            id: ChoiceId::new(id * 10 + 2),
            label: ChoiceLabel::B,
            text: "wrong".into(),
            is_correct: false,
            explanation_md: None,
            sort_order: 1,
        },
    ];
    Question::new(
        QuestionId::new(id),
        format!("question-{id}"),
        "stem text",
        "explanation text",
        difficulty,
        status,
        choices,
        vec![TagSlug::new(tag).unwrap()],
        fixed_now(),
    )
    .unwrap()
}

fn build_session(user: u64, question_ids: &[u64]) -> PracticeSession {
    PracticeSession::new(
        SessionId::random(),
        UserId::new(user),
        PracticeMode::Exam,
        question_ids.iter().copied().map(QuestionId::new).collect(),
        QuestionFilters::any(),
        fixed_now(),
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_round_trips_questions_with_tags_and_choices() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_questions?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let question = build_question(1, QuestionStatus::Published, "cardiology", Difficulty::Hard);
    repo.upsert_question(&question).await.unwrap();

    let fetched = repo.get_published(question.id()).await.unwrap().unwrap();
    assert_eq!(fetched, question);
    assert_eq!(fetched.choices().len(), 2);
    assert_eq!(fetched.correct_choice().unwrap().id, ChoiceId::new(11));
    assert_eq!(fetched.tags()[0].as_str(), "cardiology");

    // drafts are invisible through the published lookup
    let draft = build_question(2, QuestionStatus::Draft, "renal", Difficulty::Easy);
    repo.upsert_question(&draft).await.unwrap();
    assert!(repo.get_published(draft.id()).await.unwrap().is_none());
    assert!(repo.get_question(draft.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn sqlite_candidate_listing_applies_filters() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_candidates?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    for (id, status, tag, difficulty) in [
        (1, QuestionStatus::Published, "cardiology", Difficulty::Easy),
        (2, QuestionStatus::Published, "renal", Difficulty::Hard),
        (3, QuestionStatus::Draft, "cardiology", Difficulty::Easy),
        (4, QuestionStatus::Published, "cardiology", Difficulty::Hard),
    ] {
        repo.upsert_question(&build_question(id, status, tag, difficulty))
            .await
            .unwrap();
    }

    let all = repo
        .list_published_candidates(&QuestionFilters::any())
        .await
        .unwrap();
    assert_eq!(
        all.iter().map(|c| c.id.value()).collect::<Vec<_>>(),
        vec![1, 2, 4]
    );

    let filters = QuestionFilters::new(
        vec![TagSlug::new("cardiology").unwrap()],
        vec![Difficulty::Hard],
    );
    let narrowed = repo.list_published_candidates(&filters).await.unwrap();
    assert_eq!(
        narrowed.iter().map(|c| c.id.value()).collect::<Vec<_>>(),
        vec![4]
    );
}

#[tokio::test]
async fn sqlite_session_cas_guard_rejects_stale_writers() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_cas?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let session = build_session(1, &[1, 2]);
    repo.insert_session(&session).await.unwrap();

    // duplicate insert is a conflict
    assert!(matches!(
        repo.insert_session(&session).await,
        Err(storage::repository::StorageError::Conflict)
    ));

    let mut writer_a = repo.get_session(session.id()).await.unwrap().unwrap();
    let writer_b = repo.get_session(session.id()).await.unwrap().unwrap();

    writer_a
        .record_answer(QuestionId::new(1), ChoiceId::new(11), true, fixed_now())
        .unwrap();
    assert!(repo
        .update_question_states(session.id(), writer_a.version(), writer_a.states())
        .await
        .unwrap());

    // writer B read version 0 and must lose
    assert!(!repo
        .update_question_states(session.id(), writer_b.version(), writer_b.states())
        .await
        .unwrap());

    let stored = repo.get_session(session.id()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 1);
    assert!(stored.state(QuestionId::new(1)).unwrap().is_answered());
    assert!(!stored.state(QuestionId::new(2)).unwrap().is_answered());
}

#[tokio::test]
async fn sqlite_end_session_is_terminal_and_blocks_state_writes() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_end?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let session = build_session(1, &[1]);
    repo.insert_session(&session).await.unwrap();

    let ended_at = fixed_now() + Duration::seconds(120);
    assert!(repo.end_session(session.id(), ended_at).await.unwrap());
    assert!(!repo.end_session(session.id(), ended_at).await.unwrap());

    let stored = repo.get_session(session.id()).await.unwrap().unwrap();
    assert_eq!(stored.ended_at(), Some(ended_at));

    // the ended_at IS NULL guard now fails regardless of version
    assert!(!repo
        .update_question_states(session.id(), stored.version(), stored.states())
        .await
        .unwrap());
}

#[tokio::test]
async fn sqlite_attempts_support_history_and_rollback() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_attempts?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let user = UserId::new(9);
    let q1 = QuestionId::new(1);
    let q2 = QuestionId::new(2);

    let first = Attempt::new(
        AttemptId::random(),
        user,
        q1,
        None,
        ChoiceId::new(11),
        false,
        Some(30),
        fixed_now(),
    );
    let second = Attempt::new(
        AttemptId::random(),
        user,
        q1,
        None,
        ChoiceId::new(12),
        true,
        None,
        fixed_now() + Duration::seconds(90),
    );
    repo.append_attempt(&first).await.unwrap();
    repo.append_attempt(&second).await.unwrap();

    let times = repo.last_attempt_times(user, &[q1, q2]).await.unwrap();
    assert_eq!(times.get(&q1), Some(&second.answered_at));
    assert!(!times.contains_key(&q2));

    let listed = repo.list_attempts(user, 10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], second);
    assert_eq!(listed[1], first);

    repo.delete_attempt(second.id).await.unwrap();
    let listed = repo.list_attempts(user, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, first.id);
}

#[tokio::test]
async fn sqlite_idempotency_claim_round_trip() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_idem?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let key = IdempotencyKey::new(UserId::new(1), "submit_answer", "client-key-1");
    let now = fixed_now();
    let expires = now + Duration::hours(24);

    assert!(repo.claim(&key, now, expires).await.unwrap());
    assert!(!repo.claim(&key, now, expires).await.unwrap());

    repo.store_result(&key, r#"{"isCorrect":true}"#).await.unwrap();
    let record = repo.find(&key, now).await.unwrap().unwrap();
    assert_eq!(record.result.as_deref(), Some(r#"{"isCorrect":true}"#));
    assert!(record.error.is_none());

    // a different caller key is an independent claim
    let other = IdempotencyKey::new(UserId::new(1), "submit_answer", "client-key-2");
    assert!(repo.claim(&other, now, expires).await.unwrap());

    // expired records are invisible and reclaimable
    let later = expires + Duration::seconds(1);
    assert!(repo.find(&key, later).await.unwrap().is_none());
    assert!(repo.claim(&key, later, later + Duration::hours(24)).await.unwrap());

    let pruned = repo.prune_expired(later).await.unwrap();
    assert_eq!(pruned, 1); // only the other key's record had expired
}

#[tokio::test]
async fn sqlite_bookmarks_toggle_and_list() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_bookmarks?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let user = UserId::new(3);
    let q1 = QuestionId::new(1);
    let q2 = QuestionId::new(2);

    assert!(repo.set_bookmark(user, q1, true, fixed_now()).await.unwrap());
    assert!(repo
        .set_bookmark(user, q2, true, fixed_now() + Duration::seconds(5))
        .await
        .unwrap());
    assert!(!repo.set_bookmark(user, q1, true, fixed_now()).await.unwrap());

    let listed = repo.list_bookmarks(user).await.unwrap();
    assert_eq!(
        listed.iter().map(|b| b.question_id.value()).collect::<Vec<_>>(),
        vec![2, 1]
    );

    assert!(repo.set_bookmark(user, q1, false, fixed_now()).await.unwrap());
    assert_eq!(repo.list_bookmarks(user).await.unwrap().len(), 1);
}
