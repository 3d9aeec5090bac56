//! Remote ledger for virtue lessons.
//!
//! - **`store`**: the document store seam ([`DocumentStore`]) the ledger talks through
//! - **`memory`** / **`sqlite`**: in-process and SQLite-backed stores
//! - **`ledger`**: the two-phase points/completion write protocol and the reflections feed
//! - **`time`**: server time authority used for clock reconciliation

mod ledger;
mod memory;
mod sqlite;
mod store;
mod time;
mod value;

pub use ledger::{FEED_LIMIT, Ledger, RecordRef, ReflectionWrite};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{DocumentStore, StoreError, StoreFut, StoreOp};
pub use time::{MetadataTimeAuthority, TimeAuthority, TimeFut};
pub use value::{CollectionRef, DocRef, Document, FieldWrite, Fields, Value, apply_writes};
