//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests: an in-memory ledger, an
//! in-memory lock cache and a hand-driven clock, wired into a session the
//! same way the binary wires the real ones.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use ve_engine::{
    ClockSource, Collaborators, LessonSession, LocalClock, ManualClock, SessionSettings,
};
use ve_ledger::{CollectionRef, Ledger, MemoryStore, RecordRef};
use ve_local::{LocalLockStore, MemoryKeyValueStore};
use ve_types::{DeviceId, Lesson, LessonId, Page, QuizId, QuizPage};

pub const LESSON: &str = "honesty-001";
pub const DEVICE: &str = "device-under-test";

/// A minute-aligned instant, so countdown boundaries are exact.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 6, 19, 0, 0).unwrap()
}

pub fn quiz_id(id: &str) -> QuizId {
    QuizId::new(id).unwrap()
}

pub fn device() -> DeviceId {
    DeviceId::new(DEVICE).unwrap()
}

pub fn lesson_id() -> LessonId {
    LessonId::new(LESSON).unwrap()
}

/// Content, two quizzes (answers 1 and 2), reflection.
pub fn honesty_lesson() -> Arc<Lesson> {
    Arc::new(
        Lesson::new(
            lesson_id(),
            "The Value of Honesty",
            vec![
                Page::Content {
                    title: "Trust Starts with Truth".into(),
                    body: "Being honest builds trust.".into(),
                    image: None,
                },
                Page::Quiz(QuizPage {
                    id: quiz_id("benefit"),
                    question: "Which of these is a benefit of being honest?".into(),
                    options: vec![
                        "More money".into(),
                        "Trust".into(),
                        "Being popular".into(),
                        "None of the above".into(),
                    ],
                    answer_index: 1,
                }),
                Page::Quiz(QuizPage {
                    id: quiz_id("builds"),
                    question: "What can honesty help build?".into(),
                    options: vec![
                        "Loneliness".into(),
                        "Confusion".into(),
                        "Trust".into(),
                        "Doubt".into(),
                    ],
                    answer_index: 2,
                }),
                Page::Reflection {
                    prompt: "Describe a time when being honest changed the outcome.".into(),
                },
            ],
        )
        .unwrap(),
    )
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub kv: Arc<MemoryKeyValueStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::with_server_time(t0())),
            kv: Arc::new(MemoryKeyValueStore::new()),
            clock: Arc::new(ManualClock::new(t0())),
        }
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.store.clone())
    }

    pub fn locks(&self) -> LocalLockStore {
        LocalLockStore::new(self.kv.clone())
    }

    pub fn deps(&self) -> Collaborators {
        self.deps_with_clock(self.clock.clone())
    }

    pub fn deps_with_clock(&self, local: Arc<dyn LocalClock>) -> Collaborators {
        Collaborators {
            ledger: self.ledger(),
            locks: self.locks(),
            clock: Arc::new(ClockSource::unsynced(local)),
            device: device(),
        }
    }

    pub async fn open(&self) -> LessonSession {
        LessonSession::open(honesty_lesson(), self.deps(), SessionSettings::default())
            .await
            .unwrap()
    }

    /// Both quizzes answered correctly and submitted.
    pub async fn open_and_pass_quiz(&self) -> LessonSession {
        let mut session = self.open().await;
        session.advance().await.unwrap();
        session.select_option(quiz_id("benefit"), 1).await.unwrap();
        session.advance().await.unwrap();
        session.select_option(quiz_id("builds"), 2).await.unwrap();
        session.submit_quiz().await.unwrap();
        session
    }

    pub fn records(&self) -> CollectionRef {
        CollectionRef::root("users")
            .doc(DEVICE)
            .subcollection("completed_lessons")
    }

    pub fn reflections(&self) -> CollectionRef {
        CollectionRef::root("reflections")
    }

    pub fn record_of(session: &LessonSession) -> RecordRef {
        session.state().record().cloned().unwrap()
    }
}
