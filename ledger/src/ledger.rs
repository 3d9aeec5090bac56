//! Points and completion ledger.
//!
//! Layout:
//! - `users/{device_id}`: account aggregate
//! - `users/{device_id}/completed_lessons/{record_id}`: one record per quiz submission
//! - `reflections/{auto_id}`: community feed
//!
//! A lesson cycle writes in two phases. Phase 1 ([`Ledger::record_quiz`])
//! merges the quiz score into the account and creates the completion record;
//! phase 2 ([`Ledger::record_reflection`]) can only be reached with the
//! [`RecordRef`] phase 1 returned. Nothing compensates a phase 1 that fails
//! between the account merge and the record creation. Phase 2 mutates the
//! record exactly once; the feed append after it is best effort.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use ve_types::{
    CompletionRecord, DeviceId, LessonId, NonEmptyString, QuizOutcome, REFLECTION_BONUS,
    RecordId, ReflectionEntry, UserAccount,
};

use crate::store::{DocumentStore, StoreError};
use crate::value::{CollectionRef, DocRef, Document, Fields};

/// Maximum number of feed entries returned for community display.
pub const FEED_LIMIT: usize = 50;

const USERS: &str = "users";
const COMPLETED_LESSONS: &str = "completed_lessons";
const REFLECTIONS: &str = "reflections";

/// Result of a phase 2 write whose record update landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionWrite {
    Published,
    /// The record carries the reflection; the feed entry was not written.
    Unpublished(StoreError),
}

/// Handle to a completion record created by phase 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    device: DeviceId,
    id: RecordId,
}

impl RecordRef {
    #[must_use]
    pub fn new(device: DeviceId, id: RecordId) -> Self {
        Self { device, id }
    }

    #[must_use]
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    #[must_use]
    pub fn id(&self) -> &RecordId {
        &self.id
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

fn user_doc(device: &DeviceId) -> DocRef {
    CollectionRef::root(USERS).doc(device.as_str())
}

fn records_of(device: &DeviceId) -> CollectionRef {
    user_doc(device).subcollection(COMPLETED_LESSONS)
}

fn corrupt(doc: &Document, collection: &str, message: &str) -> StoreError {
    StoreError::Corrupt {
        path: format!("{collection}/{}", doc.id),
        message: message.to_owned(),
    }
}

fn account_from(device: &DeviceId, doc: &Document) -> UserAccount {
    UserAccount {
        device_id: device.clone(),
        auth_uid: doc.text("auth_uid").map(ToOwned::to_owned),
        points: doc.integer("points").unwrap_or(0),
        streak: doc.integer("streak").unwrap_or(0),
        last_lesson_date: doc.timestamp("last_lesson_date"),
    }
}

fn record_from(collection: &CollectionRef, doc: &Document) -> Result<CompletionRecord, StoreError> {
    let path = collection.as_str();
    let lesson_id = doc
        .text("lessonId")
        .and_then(|id| LessonId::new(id).ok())
        .ok_or_else(|| corrupt(doc, path, "missing lessonId"))?;
    let date = doc
        .timestamp("date")
        .ok_or_else(|| corrupt(doc, path, "missing date"))?;
    let score = doc.integer("score").unwrap_or(0);
    let total = doc.integer("total").unwrap_or(0);
    Ok(CompletionRecord {
        id: RecordId::new(doc.id.clone()).map_err(|e| corrupt(doc, path, &e.to_string()))?,
        lesson_id,
        date,
        score: u32::try_from(score).map_err(|_| corrupt(doc, path, "score out of range"))?,
        total: u32::try_from(total).map_err(|_| corrupt(doc, path, "total out of range"))?,
        points: doc.integer("points").unwrap_or(0),
        reflection: doc.text("reflection").map(ToOwned::to_owned),
        reflection_date: doc.timestamp("reflection_date"),
    })
}

impl Ledger {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn account(&self, device: &DeviceId) -> Result<Option<UserAccount>, StoreError> {
        let doc = self.store.get(&user_doc(device)).await?;
        Ok(doc.map(|doc| account_from(device, &doc)))
    }

    /// Read the account, creating it with zeroed defaults on first access.
    pub async fn ensure_account(
        &self,
        device: &DeviceId,
        auth_uid: Option<&str>,
    ) -> Result<UserAccount, StoreError> {
        if let Some(account) = self.account(device).await? {
            debug!(device = %device, "Existing user loaded");
            return Ok(account);
        }

        let fields = Fields::new()
            .set("device_id", device.as_str())
            .set("auth_uid", auth_uid)
            .set("points", 0_i64)
            .set("streak", 0_i64)
            .set("last_lesson_date", None::<DateTime<Utc>>);
        self.store.set_merge(&user_doc(device), fields).await?;
        info!(device = %device, "New user profile created");

        let mut account = UserAccount::new(device.clone());
        account.auth_uid = auth_uid.map(ToOwned::to_owned);
        Ok(account)
    }

    /// Phase 1: credit the quiz score and create the completion record.
    pub async fn record_quiz(
        &self,
        device: &DeviceId,
        lesson: &LessonId,
        outcome: QuizOutcome,
    ) -> Result<RecordRef, StoreError> {
        let user = user_doc(device);
        let previous = self
            .store
            .get(&user)
            .await?
            .and_then(|doc| doc.integer("points"))
            .unwrap_or(0);

        let account_fields = Fields::new()
            .set("points", previous.saturating_add(outcome.points()))
            .server_timestamp("last_lesson_date");
        self.store.set_merge(&user, account_fields).await?;

        let record_fields = Fields::new()
            .set("lessonId", lesson.as_str())
            .server_timestamp("date")
            .set("score", outcome.score)
            .set("total", outcome.total)
            .set("points", outcome.points());
        let id = self.store.add(&records_of(device), record_fields).await?;
        let id = RecordId::new(id).map_err(|e| StoreError::Corrupt {
            path: records_of(device).to_string(),
            message: e.to_string(),
        })?;

        info!(
            device = %device,
            lesson = %lesson,
            record = %id,
            score = outcome.score,
            total = outcome.total,
            "Quiz result recorded"
        );
        Ok(RecordRef {
            device: device.clone(),
            id,
        })
    }

    /// Phase 2: attach the reflection to its record and publish it to the feed.
    ///
    /// Fails with [`StoreError::NotFound`] if the record does not exist. Once
    /// the record update succeeds the call no longer fails: a feed error is
    /// reported as [`ReflectionWrite::Unpublished`], so the bonus is never
    /// applied twice by a resubmission.
    pub async fn record_reflection(
        &self,
        record: &RecordRef,
        lesson: &LessonId,
        text: &NonEmptyString,
    ) -> Result<ReflectionWrite, StoreError> {
        let doc = records_of(&record.device).doc(record.id.as_str());
        let update = Fields::new()
            .set("reflection", text.as_str())
            .server_timestamp("reflection_date")
            .increment("points", REFLECTION_BONUS);
        self.store.update(&doc, update).await?;

        let entry = Fields::new()
            .set("lessonId", lesson.as_str())
            .set("content", text.as_str())
            .server_timestamp("timestamp");
        if let Err(e) = self
            .store
            .add(&CollectionRef::root(REFLECTIONS), entry)
            .await
        {
            warn!(record = %record.id, lesson = %lesson, "Reflection saved but not published: {e}");
            return Ok(ReflectionWrite::Unpublished(e));
        }

        info!(device = %record.device, lesson = %lesson, record = %record.id, "Reflection recorded");
        Ok(ReflectionWrite::Published)
    }

    pub async fn completion(
        &self,
        record: &RecordRef,
    ) -> Result<Option<CompletionRecord>, StoreError> {
        let collection = records_of(&record.device);
        let doc = self.store.get(&collection.doc(record.id.as_str())).await?;
        doc.map(|doc| record_from(&collection, &doc)).transpose()
    }

    /// Completion history, most recent first.
    pub async fn completions(
        &self,
        device: &DeviceId,
        limit: usize,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        let collection = records_of(device);
        let docs = self.store.list_recent(&collection, "date", limit).await?;
        docs.iter().map(|doc| record_from(&collection, doc)).collect()
    }

    /// Community feed, newest first, never more than [`FEED_LIMIT`] entries.
    pub async fn recent_reflections(
        &self,
        limit: usize,
    ) -> Result<Vec<ReflectionEntry>, StoreError> {
        let docs = self
            .store
            .list_recent(
                &CollectionRef::root(REFLECTIONS),
                "timestamp",
                limit.min(FEED_LIMIT),
            )
            .await?;

        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            let lesson = doc.text("lessonId").and_then(|id| LessonId::new(id).ok());
            let (Some(lesson_id), Some(content), Some(timestamp)) =
                (lesson, doc.text("content"), doc.timestamp("timestamp"))
            else {
                debug!(id = %doc.id, "Skipping incomplete reflection entry");
                continue;
            };
            entries.push(ReflectionEntry {
                lesson_id,
                content: content.to_owned(),
                timestamp,
            });
        }
        Ok(entries)
    }

    /// The account's last lesson date, the authoritative lock start.
    pub async fn last_lesson_date(
        &self,
        device: &DeviceId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .account(device)
            .await?
            .and_then(|account| account.last_lesson_date))
    }
}
