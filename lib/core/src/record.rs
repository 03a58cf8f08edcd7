use crate::{AccessContext, CollectionDescriptor, Error, FieldKind, Result, Vector};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 15;

/// Externally visible record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random 15 character lowercase alphanumeric id.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id: String = (0..ID_LENGTH)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

/// Storage-internal row identifier assigned by the primary store.
///
/// It is ephemeral: the primary store may renumber rows, so it is re-read
/// for every mutation and query and never persisted as an identity of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully materialized primary-store record.
#[derive(Debug, Clone)]
pub struct Record {
    id: RecordId,
    collection: Arc<CollectionDescriptor>,
    data: Map<String, Value>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl Record {
    pub fn new(
        id: RecordId,
        collection: Arc<CollectionDescriptor>,
        data: Map<String, Value>,
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            collection,
            data,
            created,
            updated,
        }
    }

    #[inline]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    #[inline]
    pub fn collection(&self) -> &Arc<CollectionDescriptor> {
        &self.collection
    }

    #[inline]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    #[inline]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[inline]
    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Field value by name; `id` resolves to the record id.
    pub fn get(&self, field: &str) -> Option<Value> {
        if field == "id" {
            return Some(Value::String(self.id.to_string()));
        }
        self.data.get(field).cloned()
    }

    /// Stored vector of a vector field, `None` when the field has no value yet.
    pub fn vector(&self, field: &str) -> Result<Option<Vector>> {
        match self.collection.field(field) {
            Some(spec) if spec.kind == FieldKind::Vector => {}
            _ => {
                return Err(Error::Validation(format!(
                    "{} is not a vector field of {}",
                    field,
                    self.collection.name()
                )))
            }
        }
        match self.data.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Vector::from_json(field, value).map(Some),
        }
    }

    /// JSON form handed to API callers. Hidden fields are dropped unless the
    /// caller is an administrator.
    pub fn export(&self, access: &AccessContext) -> Value {
        let mut out = Map::new();
        out.insert("id".to_string(), Value::String(self.id.to_string()));
        out.insert(
            "collectionName".to_string(),
            Value::String(self.collection.name().to_string()),
        );
        out.insert("created".to_string(), Value::String(self.created.to_rfc3339()));
        out.insert("updated".to_string(), Value::String(self.updated.to_rfc3339()));

        for spec in self.collection.fields() {
            if spec.hidden && !access.is_admin() {
                continue;
            }
            let value = self.data.get(&spec.name).cloned().unwrap_or(Value::Null);
            out.insert(spec.name.clone(), value);
        }
        Value::Object(out)
    }
}
