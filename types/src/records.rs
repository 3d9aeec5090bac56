//! Ledger records as seen by the engine.

use chrono::{DateTime, Utc};

use crate::{DeviceId, LessonId, RecordId};

/// Points added to a completion record when its reflection is submitted.
pub const REFLECTION_BONUS: i64 = 1;

/// Per-installation aggregate stored at `users/{device_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub device_id: DeviceId,
    pub auth_uid: Option<String>,
    pub points: i64,
    /// Stored for compatibility; nothing computes it yet.
    pub streak: i64,
    pub last_lesson_date: Option<DateTime<Utc>>,
}

impl UserAccount {
    #[must_use]
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            auth_uid: None,
            points: 0,
            streak: 0,
            last_lesson_date: None,
        }
    }
}

/// One quiz + reflection cycle, stored under
/// `users/{device_id}/completed_lessons/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub id: RecordId,
    pub lesson_id: LessonId,
    pub date: DateTime<Utc>,
    pub score: u32,
    pub total: u32,
    pub points: i64,
    pub reflection: Option<String>,
    pub reflection_date: Option<DateTime<Utc>>,
}

/// Anonymized reflection published to the community feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionEntry {
    pub lesson_id: LessonId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Key under which the local store caches a lesson's lock start.
#[must_use]
pub fn lock_key_for(lesson: &LessonId) -> String {
    format!("lesson_{lesson}")
}
