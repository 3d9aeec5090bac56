//! Per-lesson cache of when the cooldown lock was last armed.
//!
//! This is a cache for offline launches; the ledger's `last_lesson_date`
//! wins whenever it is reachable.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use ve_types::{LessonId, lock_key_for};

use crate::kv::{KeyValueStore, StorageError};

#[derive(Clone)]
pub struct LocalLockStore {
    kv: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for LocalLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLockStore").finish_non_exhaustive()
    }
}

impl LocalLockStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Cached lock start for `lesson`. Unparseable entries read as absent.
    pub fn lock_start(&self, lesson: &LessonId) -> Result<Option<DateTime<Utc>>, StorageError> {
        let key = lock_key_for(lesson);
        let Some(raw) = self.kv.get(&key)? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
            Err(e) => {
                warn!(%key, value = %raw, "Ignoring unparseable lock timestamp: {e}");
                Ok(None)
            }
        }
    }

    pub fn record_lock_start(
        &self,
        lesson: &LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.kv.set(
            &lock_key_for(lesson),
            &at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }
}
