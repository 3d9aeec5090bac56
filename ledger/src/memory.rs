//! In-process document store.
//!
//! Used by tests and offline demos. Server time can be pinned and faults can
//! be injected per operation to exercise the ledger's failure paths.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::store::{DocumentStore, StoreError, StoreFut, StoreOp, sort_recent};
use crate::value::{CollectionRef, DocRef, Document, Fields, Value, apply_writes};

#[derive(Debug)]
struct StoredDoc {
    seq: u64,
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, StoredDoc>>,
    seq: u64,
    pinned_time: Option<DateTime<Utc>>,
    faults: Vec<(Option<StoreOp>, StoreError)>,
}

impl Inner {
    fn server_now(&self) -> DateTime<Utc> {
        self.pinned_time.unwrap_or_else(Utc::now)
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn take_fault(&mut self, op: StoreOp) -> Result<(), StoreError> {
        let index = self
            .faults
            .iter()
            .position(|(target, _)| target.is_none_or(|target| target == op));
        match index {
            Some(index) => Err(self.faults.remove(index).1),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose server clock is pinned to `now`.
    #[must_use]
    pub fn with_server_time(now: DateTime<Utc>) -> Self {
        let store = Self::new();
        store.set_server_time(now);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_server_time(&self, now: DateTime<Utc>) {
        self.lock().pinned_time = Some(now);
    }

    /// Move a pinned server clock forward. No-op for the live clock.
    pub fn advance_server_time(&self, by: Duration) {
        let mut inner = self.lock();
        if let Some(now) = inner.pinned_time {
            inner.pinned_time = Some(now + by);
        }
    }

    /// Fail the next call of any operation with `error`.
    pub fn fail_next(&self, error: StoreError) {
        self.lock().faults.push((None, error));
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next_op(&self, op: StoreOp, error: StoreError) {
        self.lock().faults.push((Some(op), error));
    }

    #[must_use]
    pub fn len(&self, collection: &CollectionRef) -> usize {
        self.lock()
            .collections
            .get(collection.as_str())
            .map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self, collection: &CollectionRef) -> bool {
        self.len(collection) == 0
    }

    fn get_sync(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        let mut inner = self.lock();
        inner.take_fault(StoreOp::Get)?;
        Ok(inner
            .collections
            .get(doc.collection.as_str())
            .and_then(|docs| docs.get(&doc.id))
            .map(|stored| Document {
                id: doc.id.clone(),
                fields: stored.fields.clone(),
            }))
    }

    fn set_merge_sync(&self, doc: &DocRef, fields: Fields) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.take_fault(StoreOp::SetMerge)?;
        let now = inner.server_now();
        let seq = inner.next_seq();
        let stored = inner
            .collections
            .entry(doc.collection.as_str().to_owned())
            .or_default()
            .entry(doc.id.clone())
            .or_insert_with(|| StoredDoc {
                seq,
                fields: BTreeMap::new(),
            });
        apply_writes(&mut stored.fields, fields, now);
        Ok(())
    }

    fn update_sync(&self, doc: &DocRef, fields: Fields) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.take_fault(StoreOp::Update)?;
        let now = inner.server_now();
        let stored = inner
            .collections
            .get_mut(doc.collection.as_str())
            .and_then(|docs| docs.get_mut(&doc.id))
            .ok_or_else(|| StoreError::NotFound {
                path: doc.to_string(),
            })?;
        apply_writes(&mut stored.fields, fields, now);
        Ok(())
    }

    fn add_sync(&self, collection: &CollectionRef, fields: Fields) -> Result<String, StoreError> {
        let mut inner = self.lock();
        inner.take_fault(StoreOp::Add)?;
        let now = inner.server_now();
        let seq = inner.next_seq();
        let id = Uuid::new_v4().simple().to_string();
        let mut resolved = BTreeMap::new();
        apply_writes(&mut resolved, fields, now);
        inner
            .collections
            .entry(collection.as_str().to_owned())
            .or_default()
            .insert(
                id.clone(),
                StoredDoc {
                    seq,
                    fields: resolved,
                },
            );
        Ok(id)
    }

    fn list_recent_sync(
        &self,
        collection: &CollectionRef,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let mut inner = self.lock();
        inner.take_fault(StoreOp::List)?;
        let mut docs: Vec<(u64, Document)> = inner
            .collections
            .get(collection.as_str())
            .map(|docs| {
                docs.iter()
                    .map(|(id, stored)| {
                        (
                            stored.seq,
                            Document {
                                id: id.clone(),
                                fields: stored.fields.clone(),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        sort_recent(&mut docs, order_by);
        Ok(docs.into_iter().take(limit).map(|(_, doc)| doc).collect())
    }
}

impl DocumentStore for MemoryStore {
    fn get<'a>(&'a self, doc: &'a DocRef) -> StoreFut<'a, Option<Document>> {
        Box::pin(async move { self.get_sync(doc) })
    }

    fn set_merge<'a>(&'a self, doc: &'a DocRef, fields: Fields) -> StoreFut<'a, ()> {
        Box::pin(async move { self.set_merge_sync(doc, fields) })
    }

    fn update<'a>(&'a self, doc: &'a DocRef, fields: Fields) -> StoreFut<'a, ()> {
        Box::pin(async move { self.update_sync(doc, fields) })
    }

    fn add<'a>(&'a self, collection: &'a CollectionRef, fields: Fields) -> StoreFut<'a, String> {
        Box::pin(async move { self.add_sync(collection, fields) })
    }

    fn list_recent<'a>(
        &'a self,
        collection: &'a CollectionRef,
        order_by: &'a str,
        limit: usize,
    ) -> StoreFut<'a, Vec<Document>> {
        Box::pin(async move { self.list_recent_sync(collection, order_by, limit) })
    }
}
