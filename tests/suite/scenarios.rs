//! End-to-end lesson cycles against the in-memory ledger.

use chrono::TimeDelta;
use ve_engine::Stage;
use ve_ledger::{StoreError, StoreOp};
use ve_types::{LessonError, ValidationError};

use crate::common::{Harness, device, lesson_id, quiz_id, t0};

#[tokio::test]
async fn all_correct_quiz_credits_account_and_creates_record() {
    let h = Harness::new();
    let mut session = h.open_and_pass_quiz().await;

    let outcome = session.state().outcome().unwrap();
    assert_eq!((outcome.score, outcome.total), (2, 2));
    assert_eq!(session.stage(), Stage::ReflectionActive);

    let account = h.ledger().account(&device()).await.unwrap().unwrap();
    assert_eq!(account.points, 2);
    assert_eq!(account.last_lesson_date, Some(t0()));

    let record = h
        .ledger()
        .completion(&Harness::record_of(&session))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.lesson_id, lesson_id());
    assert_eq!((record.score, record.total, record.points), (2, 2, 2));
    assert!(record.reflection.is_none());
    assert!(session.take_notices().is_empty());
}

#[tokio::test]
async fn reflection_adds_bonus_and_publishes_to_feed() {
    let h = Harness::new();
    let mut session = h.open_and_pass_quiz().await;
    let record_ref = Harness::record_of(&session);

    h.clock.advance(TimeDelta::seconds(20));
    session
        .submit_reflection("  I learned to tell the truth.  ")
        .await
        .unwrap();
    assert_eq!(session.stage(), Stage::Locked);

    let record = h.ledger().completion(&record_ref).await.unwrap().unwrap();
    assert_eq!(record.reflection.as_deref(), Some("I learned to tell the truth."));
    assert_eq!(record.points, 3);
    assert!(record.reflection_date.is_some());

    let feed = h.ledger().recent_reflections(50).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].content, "I learned to tell the truth.");
    assert_eq!(feed[0].lesson_id, lesson_id());

    // The bonus lives on the record; the account keeps the quiz points.
    let account = h.ledger().account(&device()).await.unwrap().unwrap();
    assert_eq!(account.points, 2);

    assert_eq!(
        h.locks().lock_start(&lesson_id()).unwrap(),
        Some(t0() + TimeDelta::seconds(20))
    );
}

#[tokio::test]
async fn partially_correct_quiz_scores_only_matches() {
    let h = Harness::new();
    let mut session = h.open().await;
    session.advance().await.unwrap();
    session.select_option(quiz_id("benefit"), 0).await.unwrap();
    // Re-selection overwrites the earlier pick.
    session.select_option(quiz_id("benefit"), 1).await.unwrap();
    session.advance().await.unwrap();
    session.select_option(quiz_id("builds"), 3).await.unwrap();
    session.submit_quiz().await.unwrap();

    let outcome = session.state().outcome().unwrap();
    assert_eq!((outcome.score, outcome.total), (1, 2));
    let account = h.ledger().account(&device()).await.unwrap().unwrap();
    assert_eq!(account.points, 1);
}

#[tokio::test]
async fn network_failure_on_quiz_keeps_score_without_record() {
    let h = Harness::new();
    let mut session = h.open().await;
    session.advance().await.unwrap();
    session.select_option(quiz_id("benefit"), 1).await.unwrap();
    session.advance().await.unwrap();
    session.select_option(quiz_id("builds"), 2).await.unwrap();

    h.store.fail_next(StoreError::Network("connection reset".into()));
    session.submit_quiz().await.unwrap();

    assert_eq!(session.state().outcome().unwrap().score, 2);
    assert!(session.state().record().is_none());
    assert_eq!(h.store.len(&h.records()), 0);

    let notices = session.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Submission Error");
    assert!(notices[0].message.contains("connection reset"));
    assert!(notices[0].retryable);

    // Navigation still works after the failure.
    session.retreat().await.unwrap();
    session.advance().await.unwrap();

    session.retry_sync().await.unwrap();
    assert!(session.state().record().is_some());
    assert_eq!(h.store.len(&h.records()), 1);
}

#[tokio::test]
async fn reflection_before_quiz_is_rejected_without_writes() {
    let h = Harness::new();
    let mut session = h.open().await;
    for _ in 0..3 {
        session.advance().await.unwrap();
    }

    let err = session.submit_reflection("Too early").await.unwrap_err();
    assert!(matches!(err, LessonError::PreconditionViolation(_)));
    assert!(h.store.is_empty(&h.reflections()));
}

#[tokio::test]
async fn blank_reflection_is_a_validation_error() {
    let h = Harness::new();
    let mut session = h.open_and_pass_quiz().await;

    let err = session.submit_reflection("   \n").await.unwrap_err();
    assert_eq!(err, LessonError::Validation(ValidationError::EmptyReflection));
    assert!(!session.state().is_completed());
    assert!(h.store.is_empty(&h.reflections()));
}

#[tokio::test]
async fn failed_reflection_update_publishes_nothing() {
    let h = Harness::new();
    let mut session = h.open_and_pass_quiz().await;

    h.store
        .fail_next_op(StoreOp::Update, StoreError::PermissionDenied("rules".into()));
    session.submit_reflection("Honesty helped").await.unwrap();

    assert!(!session.state().is_completed());
    assert!(h.store.is_empty(&h.reflections()));
    let notices = session.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(!notices[0].retryable);

    // The user re-triggers the action; nothing retries on its own.
    session.submit_reflection("Honesty helped").await.unwrap();
    assert!(session.state().is_completed());
    assert_eq!(h.store.len(&h.reflections()), 1);
}

#[tokio::test]
async fn feed_failure_completes_lesson_with_a_single_bonus() {
    let h = Harness::new();
    let mut session = h.open_and_pass_quiz().await;
    let record_ref = Harness::record_of(&session);

    h.store
        .fail_next_op(StoreOp::Add, StoreError::Network("feed unreachable".into()));
    session.submit_reflection("Owned up to it.").await.unwrap();

    assert!(session.state().is_completed());
    assert_eq!(session.stage(), Stage::Locked);
    let notices = session.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Community Feed");
    assert!(!notices[0].retryable);

    // A second submit is refused, so the bonus cannot land twice.
    let err = session.submit_reflection("Owned up to it.").await.unwrap_err();
    assert!(matches!(err, LessonError::PreconditionViolation(_)));

    let record = h.ledger().completion(&record_ref).await.unwrap().unwrap();
    assert_eq!(record.points, 3);
    assert_eq!(record.reflection.as_deref(), Some("Owned up to it."));
    assert!(h.store.is_empty(&h.reflections()));
}
