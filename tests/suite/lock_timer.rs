//! Cooldown lock, countdown display and ticker lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ve_engine::{LessonSession, LocalClock, SessionSettings, Stage};
use ve_ledger::{StoreError, StoreOp};

use crate::common::{Harness, honesty_lesson, lesson_id, t0};

/// Device clock that follows tokio's (pausable) clock.
struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl LocalClock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed =
            TimeDelta::from_std(self.started.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        self.base + elapsed
    }
}

#[tokio::test]
async fn locked_ninety_seconds_after_completion_shows_thirty_seconds() {
    let h = Harness::new();
    h.locks()
        .record_lock_start(&lesson_id(), t0() - TimeDelta::seconds(90))
        .unwrap();
    // Offline launch: the local cache decides.
    h.store
        .fail_next_op(StoreOp::Get, StoreError::Network("down".into()));
    h.store
        .fail_next_op(StoreOp::Get, StoreError::Network("down".into()));

    let session = h.open().await;
    assert_eq!(session.stage(), Stage::Locked);
    assert_eq!(session.state().countdown().unwrap().to_string(), "0m 30s");
    assert!(session.is_ticking());
}

#[tokio::test]
async fn countdown_decreases_and_never_goes_negative() {
    let h = Harness::new();
    let mut session = h.open_and_pass_quiz().await;
    session.submit_reflection("Truth first.").await.unwrap();

    let mut shown = Vec::new();
    for secs in [0, 30, 90, 119] {
        h.clock.set(t0() + TimeDelta::seconds(secs));
        session.tick().await.unwrap();
        shown.push(session.state().countdown().unwrap().to_string());
    }
    assert_eq!(shown, ["2m 0s", "1m 30s", "0m 30s", "0m 1s"]);

    h.clock.set(t0() + TimeDelta::minutes(5));
    session.tick().await.unwrap();
    assert!(session.state().countdown().is_none());
    assert_eq!(session.stage(), Stage::Viewing(0));
}

#[tokio::test]
async fn lock_predicate_boundary_is_exactly_two_minutes() {
    let h = Harness::new();
    let mut session = h.open_and_pass_quiz().await;
    session.submit_reflection("Truth first.").await.unwrap();

    h.clock
        .set(t0() + TimeDelta::seconds(120) - TimeDelta::milliseconds(1));
    session.tick().await.unwrap();
    assert!(session.state().is_locked());

    h.clock.set(t0() + TimeDelta::seconds(120));
    session.tick().await.unwrap();
    assert!(!session.state().is_locked());
    assert!(!session.is_ticking());
}

#[tokio::test(start_paused = true)]
async fn ticker_unlocks_session_and_stops_firing() {
    let h = Harness::new();
    let local: Arc<dyn LocalClock> = Arc::new(TokioClock::new(t0()));
    let settings = SessionSettings {
        tick_period: Duration::from_secs(1),
        ..SessionSettings::default()
    };
    h.locks()
        .record_lock_start(&lesson_id(), t0() - TimeDelta::seconds(100))
        .unwrap();
    h.store
        .fail_next_op(StoreOp::Get, StoreError::Network("down".into()));
    h.store
        .fail_next_op(StoreOp::Get, StoreError::Network("down".into()));

    let mut session = LessonSession::open(honesty_lesson(), h.deps_with_clock(local), settings)
        .await
        .unwrap();
    assert_eq!(session.stage(), Stage::Locked);

    let mut ticks = 0;
    session
        .run_until_unlocked(|state| {
            ticks += 1;
            if let Some(countdown) = state.countdown() {
                assert!(countdown.rounded_secs() >= 0);
            }
        })
        .await
        .unwrap();

    assert_eq!(session.stage(), Stage::Viewing(0));
    assert!(ticks >= 20, "expected roughly one tick per second, got {ticks}");
    assert!(!session.is_ticking());
    assert!(session.next_tick().await.is_none());
}
