//! SQLite-backed document store.
//!
//! Serves as a self-hosted ledger: documents are JSON bodies keyed by
//! `(collection, id)`, and server time is this process's UTC clock. Each call
//! runs inside one SQLite transaction so sentinel resolution is atomic.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::store::{DocumentStore, StoreError, StoreFut, sort_recent};
use crate::value::{CollectionRef, DocRef, Document, Fields, Value, apply_writes};

type Body = BTreeMap<String, Value>;

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn db_error(err: rusqlite::Error) -> StoreError {
    StoreError::Network(format!("ledger database error: {err}"))
}

fn decode(path: &str, data: &str) -> Result<Body, StoreError> {
    serde_json::from_str(data).map_err(|e| StoreError::Corrupt {
        path: path.to_owned(),
        message: e.to_string(),
    })
}

fn encode(path: &str, body: &Body) -> Result<String, StoreError> {
    serde_json::to_string(body).map_err(|e| StoreError::Corrupt {
        path: path.to_owned(),
        message: e.to_string(),
    })
}

impl SqliteStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            seq INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_collection_seq
        ON documents(collection, seq);
    ";

    /// Open or create the ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prepare_db_path(path)?;
        let db = Connection::open(path)
            .with_context(|| format!("Failed to open ledger at {}", path.display()))?;
        Self::initialize(db)
    }

    /// Open an in-memory ledger (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory ledger")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .context("Failed to set ledger pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create ledger schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_seq(tx: &rusqlite::Transaction<'_>) -> Result<i64, StoreError> {
        tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM documents", [], |row| {
            row.get(0)
        })
        .map_err(db_error)
    }

    fn read_body(
        tx: &rusqlite::Transaction<'_>,
        doc: &DocRef,
    ) -> Result<Option<Body>, StoreError> {
        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                params![doc.collection.as_str(), &doc.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        data.map(|data| decode(&doc.to_string(), &data)).transpose()
    }

    fn get_sync(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_error)?;
        let body = Self::read_body(&tx, doc)?;
        Ok(body.map(|fields| Document {
            id: doc.id.clone(),
            fields,
        }))
    }

    fn write_sync(&self, doc: &DocRef, fields: Fields, must_exist: bool) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_error)?;
        let path = doc.to_string();
        let existing = Self::read_body(&tx, doc)?;
        if must_exist && existing.is_none() {
            return Err(StoreError::NotFound { path });
        }
        let is_new = existing.is_none();
        let mut body = existing.unwrap_or_default();
        apply_writes(&mut body, fields, Utc::now());
        let data = encode(&path, &body)?;

        if is_new {
            let seq = Self::next_seq(&tx)?;
            tx.execute(
                "INSERT INTO documents (collection, id, data, seq) VALUES (?1, ?2, ?3, ?4)",
                params![doc.collection.as_str(), &doc.id, data, seq],
            )
            .map_err(db_error)?;
        } else {
            tx.execute(
                "UPDATE documents SET data = ?3 WHERE collection = ?1 AND id = ?2",
                params![doc.collection.as_str(), &doc.id, data],
            )
            .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)
    }

    fn add_sync(&self, collection: &CollectionRef, fields: Fields) -> Result<String, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_error)?;
        let id = Uuid::new_v4().simple().to_string();
        let mut body = Body::new();
        apply_writes(&mut body, fields, Utc::now());
        let data = encode(&collection.doc(&id).to_string(), &body)?;
        let seq = Self::next_seq(&tx)?;
        tx.execute(
            "INSERT INTO documents (collection, id, data, seq) VALUES (?1, ?2, ?3, ?4)",
            params![collection.as_str(), &id, data, seq],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        Ok(id)
    }

    fn list_recent_sync(
        &self,
        collection: &CollectionRef,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, data, seq FROM documents WHERE collection = ?1")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([collection.as_str()], |row| {
                let id: String = row.get(0)?;
                let data: String = row.get(1)?;
                let seq: i64 = row.get(2)?;
                Ok((id, data, seq))
            })
            .map_err(db_error)?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, data, seq) = row.map_err(db_error)?;
            let path = collection.doc(&id).to_string();
            match decode(&path, &data) {
                Ok(fields) => docs.push((seq as u64, Document { id, fields })),
                Err(e) => tracing::warn!(%path, "Skipping unreadable document: {e}"),
            }
        }
        sort_recent(&mut docs, order_by);
        Ok(docs.into_iter().take(limit).map(|(_, doc)| doc).collect())
    }
}

impl DocumentStore for SqliteStore {
    fn get<'a>(&'a self, doc: &'a DocRef) -> StoreFut<'a, Option<Document>> {
        Box::pin(async move { self.get_sync(doc) })
    }

    fn set_merge<'a>(&'a self, doc: &'a DocRef, fields: Fields) -> StoreFut<'a, ()> {
        Box::pin(async move { self.write_sync(doc, fields, false) })
    }

    fn update<'a>(&'a self, doc: &'a DocRef, fields: Fields) -> StoreFut<'a, ()> {
        Box::pin(async move { self.write_sync(doc, fields, true) })
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

/// Create the parent directory (0o700) and the database file (0o600).
fn prepare_db_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        #[cfg(unix)]
        tighten_owned(parent, 0o700)?;
    }

    if !path.exists() {
        let mut options = std::fs::OpenOptions::new();
        options.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(path)
            .with_context(|| format!("Failed to create ledger file: {}", path.display()))?;
    }
    #[cfg(unix)]
    tighten_owned(path, 0o600)?;
    Ok(())
}

/// Drop group/other permission bits on a path we own.
#[cfg(unix)]
fn tighten_owned(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    let our_uid = unsafe { libc::getuid() };
    if metadata.uid() != our_uid {
        return Ok(());
    }
    if metadata.permissions().mode() & 0o077 != 0 {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::store::{DocumentStore, StoreError};
    use crate::value::{CollectionRef, Fields};

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("ledger.db");
        let doc = CollectionRef::root("users").doc("d1");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set_merge(&doc, Fields::new().set("points", 3_i64))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let read = store.get(&doc).await.unwrap().unwrap();
        assert_eq!(read.integer("points"), Some(3));
    }

    #[tokio::test]
    async fn increment_and_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records = CollectionRef::root("users").doc("d").subcollection("completed_lessons");
        let id = store
            .add(&records, Fields::new().set("points", 2_i64).server_timestamp("date"))
            .await
            .unwrap();
        store
            .update(&records.doc(&id), Fields::new().increment("points", 1))
            .await
            .unwrap();
        let read = store.get(&records.doc(&id)).await.unwrap().unwrap();
        assert_eq!(read.integer("points"), Some(3));
        assert!(read.timestamp("date").is_some());

        let missing = store
            .update(&records.doc("nope"), Fields::new().increment("points", 1))
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_recent_is_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let feed = CollectionRef::root("reflections");
        for n in 0..3_i64 {
            store
                .add(&feed, Fields::new().set("n", n).server_timestamp("timestamp"))
                .await
                .unwrap();
        }
        let docs = store.list_recent(&feed, "timestamp", 10).await.unwrap();
        let order: Vec<_> = docs.iter().map(|doc| doc.integer("n").unwrap()).collect();
        // Equal timestamps fall back to insertion order, newest first.
        assert_eq!(order.first(), Some(&2));
        assert_eq!(order.len(), 3);
    }
}
