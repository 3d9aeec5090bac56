//! Remote document store abstraction.

use std::future::Future;
use std::pin::Pin;

use ve_types::LessonError;

use crate::value::{CollectionRef, DocRef, Document, Fields};

/// Store operation future type alias.
pub type StoreFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("document not found: {path}")]
    NotFound { path: String },
    #[error("corrupt document {path}: {message}")]
    Corrupt { path: String, message: String },
}

impl From<StoreError> for LessonError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Network(message) => LessonError::Network(message),
            StoreError::PermissionDenied(message) => LessonError::PermissionDenied(message),
            StoreError::NotFound { .. } => {
                LessonError::PreconditionViolation("completion record does not exist")
            }
            StoreError::Corrupt { path, message } => {
                LessonError::Network(format!("unreadable document {path}: {message}"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    SetMerge,
    Update,
    Add,
    List,
}

/// A keyed document store with append-only collections.
///
/// Implementations resolve `ServerTimestamp` and `Increment` writes
/// atomically per call using their own notion of server time.
pub trait DocumentStore: Send + Sync {
    fn get<'a>(&'a self, doc: &'a DocRef) -> StoreFut<'a, Option<Document>>;

    /// Create the document if missing, otherwise overwrite only the given fields.
    fn set_merge<'a>(&'a self, doc: &'a DocRef, fields: Fields) -> StoreFut<'a, ()>;

    /// Modify an existing document. Fails with [`StoreError::NotFound`]
    /// instead of creating it.
    fn update<'a>(&'a self, doc: &'a DocRef, fields: Fields) -> StoreFut<'a, ()>;

    /// Append a document with a store-assigned id and return that id.
    fn add<'a>(&'a self, collection: &'a CollectionRef, fields: Fields) -> StoreFut<'a, String>;

    /// Documents of `collection` ordered by the timestamp field `order_by`,
    /// newest first. Documents lacking the field sort last.
    fn list_recent<'a>(
        &'a self,
        collection: &'a CollectionRef,
        order_by: &'a str,
        limit: usize,
    ) -> StoreFut<'a, Vec<Document>>;
}

/// Sort newest first by `order_by`, breaking ties by insertion order.
pub(crate) fn sort_recent(docs: &mut [(u64, Document)], order_by: &str) {
    docs.sort_by(|(seq_a, a), (seq_b, b)| {
        b.timestamp(order_by)
            .cmp(&a.timestamp(order_by))
            .then(seq_b.cmp(seq_a))
    });
}
