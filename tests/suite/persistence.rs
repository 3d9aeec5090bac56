//! Launch reconciliation and durable stores across sessions.

use std::sync::Arc;

use chrono::TimeDelta;
use ve_engine::{
    ClockSource, Collaborators, LessonSession, ManualClock, SessionSettings, Stage, SystemClock,
};
use ve_ledger::{
    CollectionRef, DocumentStore, Fields, Ledger, MetadataTimeAuthority, SqliteStore, StoreError,
};
use ve_local::{FileKeyValueStore, KeyValueStore, LocalLockStore};

use crate::common::{DEVICE, Harness, device, honesty_lesson, lesson_id, quiz_id, t0};

#[tokio::test]
async fn ledger_date_wins_over_missing_local_cache() {
    let h = Harness::new();
    h.store
        .set_merge(
            &CollectionRef::root("users").doc(DEVICE),
            Fields::new().set("last_lesson_date", t0() - TimeDelta::seconds(45)),
        )
        .await
        .unwrap();

    let session = h.open().await;
    assert_eq!(session.stage(), Stage::Locked);
    // The cache is refreshed from the ledger.
    assert_eq!(
        h.locks().lock_start(&lesson_id()).unwrap(),
        Some(t0() - TimeDelta::seconds(45))
    );
}

#[tokio::test]
async fn newer_local_cache_is_kept_when_ledger_is_behind() {
    let h = Harness::new();
    h.store
        .set_merge(
            &CollectionRef::root("users").doc(DEVICE),
            Fields::new().set("last_lesson_date", t0() - TimeDelta::hours(2)),
        )
        .await
        .unwrap();
    h.locks()
        .record_lock_start(&lesson_id(), t0() - TimeDelta::seconds(10))
        .unwrap();

    let session = h.open().await;
    assert_eq!(session.stage(), Stage::Locked);
    assert_eq!(
        session.state().lock_window().unwrap().start(),
        t0() - TimeDelta::seconds(10)
    );
}

#[tokio::test]
async fn garbage_local_cache_reads_as_unlocked_offline() {
    let h = Harness::new();
    h.kv.set("lesson_honesty-001", "not a timestamp").unwrap();
    h.store.fail_next(StoreError::Network("down".into()));
    h.store.fail_next(StoreError::Network("down".into()));

    let session = h.open().await;
    assert_eq!(session.stage(), Stage::Viewing(0));
}

#[tokio::test]
async fn clock_offset_defeats_a_rewound_device_clock() {
    let h = Harness::new();
    // Server says t0; the device clock was set back an hour.
    h.store
        .set_merge(
            &MetadataTimeAuthority::doc_ref(),
            Fields::new().server_timestamp(MetadataTimeAuthority::FIELD),
        )
        .await
        .unwrap();
    let local = Arc::new(ManualClock::new(t0() - TimeDelta::hours(1)));
    let deps = Collaborators::with_sampled_clock(h.ledger(), h.locks(), local, device()).await;
    assert_eq!(deps.clock.adjusted_now(), t0());

    h.locks()
        .record_lock_start(&lesson_id(), t0() - TimeDelta::seconds(30))
        .unwrap();
    h.store.fail_next(StoreError::Network("down".into()));
    h.store.fail_next(StoreError::Network("down".into()));
    let session = LessonSession::open(honesty_lesson(), deps, SessionSettings::default())
        .await
        .unwrap();
    assert_eq!(session.stage(), Stage::Locked);
    assert_eq!(session.state().countdown().unwrap().to_string(), "1m 30s");
}

#[tokio::test]
async fn sqlite_ledger_and_file_cache_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ledger.db");
    let kv_path = dir.path().join("local.json");
    // SQLite stamps real server time, so the device clock must be real too.
    let open = || {
        let db_path = db_path.clone();
        let kv_path = kv_path.clone();
        async move {
            let store = Arc::new(SqliteStore::open(&db_path).unwrap());
            let kv = Arc::new(FileKeyValueStore::open(kv_path).unwrap());
            let deps = Collaborators {
                ledger: Ledger::new(store),
                locks: LocalLockStore::new(kv),
                clock: Arc::new(ClockSource::unsynced(Arc::new(SystemClock))),
                device: device(),
            };
            LessonSession::open(honesty_lesson(), deps, SessionSettings::default())
                .await
                .unwrap()
        }
    };

    let mut session = open().await;
    session.advance().await.unwrap();
    session.select_option(quiz_id("benefit"), 1).await.unwrap();
    session.submit_quiz().await.unwrap();
    session.submit_reflection("Saying sorry first.").await.unwrap();
    assert_eq!(session.stage(), Stage::Locked);
    drop(session);

    let reopened = open().await;
    assert_eq!(reopened.stage(), Stage::Locked);

    let account = reopened
        .collaborators()
        .ledger
        .account(&device())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.points, 1);
    let history = reopened
        .collaborators()
        .ledger
        .completions(&device(), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].points, 2);
    assert_eq!(history[0].reflection.as_deref(), Some("Saying sorry first."));
}
