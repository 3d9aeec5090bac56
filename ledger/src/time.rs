//! Authoritative server time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::{DocumentStore, StoreError};
use crate::value::{CollectionRef, DocRef};

pub type TimeFut<'a> =
    Pin<Box<dyn Future<Output = Result<Option<DateTime<Utc>>, StoreError>> + Send + 'a>>;

/// Source of server time. `Ok(None)` is a normal outcome, not an error.
pub trait TimeAuthority: Send + Sync {
    fn fetch_server_timestamp(&self) -> TimeFut<'_>;
}

/// Reads `metadata/serverTime.timestamp`, a document the backend keeps fresh.
pub struct MetadataTimeAuthority {
    store: Arc<dyn DocumentStore>,
    doc: DocRef,
}

impl MetadataTimeAuthority {
    pub const FIELD: &'static str = "timestamp";

    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            doc: Self::doc_ref(),
        }
    }

    #[must_use]
    pub fn doc_ref() -> DocRef {
        CollectionRef::root("metadata").doc("serverTime")
    }
}

impl TimeAuthority for MetadataTimeAuthority {
    fn fetch_server_timestamp(&self) -> TimeFut<'_> {
        Box::pin(async move {
            let doc = self.store.get(&self.doc).await?;
            Ok(doc.and_then(|doc| doc.timestamp(Self::FIELD)))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{MetadataTimeAuthority, TimeAuthority};
    use crate::memory::MemoryStore;
    use crate::store::DocumentStore;
    use crate::value::Fields;

    #[tokio::test]
    async fn missing_metadata_is_absent_not_error() {
        let store = Arc::new(MemoryStore::new());
        let authority = MetadataTimeAuthority::new(store);
        assert_eq!(authority.fetch_server_timestamp().await, Ok(None));
    }

    #[tokio::test]
    async fn reads_server_stamped_metadata() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        let store = Arc::new(MemoryStore::with_server_time(now));
        store
            .set_merge(
                &MetadataTimeAuthority::doc_ref(),
                Fields::new().server_timestamp(MetadataTimeAuthority::FIELD),
            )
            .await
            .unwrap();
        let authority = MetadataTimeAuthority::new(store);
        assert_eq!(authority.fetch_server_timestamp().await, Ok(Some(now)));
    }
}
