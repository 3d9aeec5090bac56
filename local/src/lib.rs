//! On-device collaborators for virtue lessons.
//!
//! - **`kv`**: durable key-value storage (file-backed, crash-safe writes)
//! - **`lock_store`**: per-lesson lock timestamp cache on top of `kv`
//! - **`identity`**: hashed, stable installation id

pub mod identity;
pub mod kv;
pub mod lock_store;

pub use identity::{HashedDeviceId, IdentityError, IdentityProvider, PlatformIdSource, hash_platform_id};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StorageError};
pub use lock_store::LocalLockStore;
