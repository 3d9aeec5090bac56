//! Document values and write sentinels.
//!
//! Stored documents only ever contain concrete [`Value`]s. Writes are
//! expressed as [`Fields`], which may additionally carry the two server-side
//! primitives the ledger relies on: a server-assigned timestamp and an atomic
//! numeric increment. Stores resolve both at write time via [`apply_writes`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldWrite {
    Set(Value),
    ServerTimestamp,
    Increment(i64),
}

/// An ordered set of field writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, FieldWrite>);

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_owned(), FieldWrite::Set(value.into()));
        self
    }

    #[must_use]
    pub fn server_timestamp(mut self, name: &str) -> Self {
        self.0.insert(name.to_owned(), FieldWrite::ServerTimestamp);
        self
    }

    #[must_use]
    pub fn increment(mut self, name: &str, by: i64) -> Self {
        self.0.insert(name.to_owned(), FieldWrite::Increment(by));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldWrite)> {
        self.0.iter().map(|(name, write)| (name.as_str(), write))
    }
}

/// Resolve `fields` against `existing`, using `server_now` for timestamps.
///
/// An increment of a missing or non-integer field starts from zero.
pub fn apply_writes(
    existing: &mut BTreeMap<String, Value>,
    fields: Fields,
    server_now: DateTime<Utc>,
) {
    for (name, write) in fields.0 {
        let resolved = match write {
            FieldWrite::Set(value) => value,
            FieldWrite::ServerTimestamp => Value::Timestamp(server_now),
            FieldWrite::Increment(by) => {
                let base = match existing.get(&name) {
                    Some(Value::Integer(current)) => *current,
                    _ => 0,
                };
                Value::Integer(base.saturating_add(by))
            }
        };
        existing.insert(name, resolved);
    }
}

/// A document as read back from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: BTreeMap<String, Value>,
}

impl Document {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name) {
            Some(Value::Timestamp(value)) => Some(*value),
            _ => None,
        }
    }
}

/// Path of a collection, e.g. `users/abc/completed_lessons`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionRef(String);

impl CollectionRef {
    #[must_use]
    pub fn root(name: &str) -> Self {
        Self(name.to_owned())
    }

    #[must_use]
    pub fn doc(&self, id: &str) -> DocRef {
        DocRef {
            collection: self.clone(),
            id: id.to_owned(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: CollectionRef,
    pub id: String,
}

impl DocRef {
    #[must_use]
    pub fn subcollection(&self, name: &str) -> CollectionRef {
        CollectionRef(format!("{}/{}/{name}", self.collection, self.id))
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
