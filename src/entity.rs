use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

/// A schema-declared record with exactly one identity field.
///
/// Entities are stored as JSON documents. Embedded entities are plain nested
/// structs; they flatten into the owner's document and are addressed by
/// dotted path (`"address.city"`). Fields that must not be stored are skipped
/// with `#[serde(skip)]`.
///
/// ```
/// use acidhouse::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Account {
///     id: String,
///     balance: i64,
/// }
///
/// impl Entity for Account {
///     const KIND: &'static str = "Account";
///     const KEY: &'static str = "id";
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + 'static {
    /// Kind name, the backend's table/collection for this type.
    const KIND: &'static str;
    /// Dotted path of the identity field.
    const KEY: &'static str;
}

/// Identity of a stored entity: its kind and its key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    kind: String,
    id: String,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Key for an entity type known at compile time.
    pub fn of<E: Entity>(id: impl Into<String>) -> Self {
        Self::new(E::KIND, id)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The identity field's value.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

/// An entity in its stored form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    key: EntityKey,
    body: Value,
}

impl Document {
    pub fn new(key: EntityKey, body: Value) -> Self {
        Self { key, body }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    /// Decodes the document back into its entity type.
    pub fn decode<E: Entity>(&self) -> Result<E> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Globally unique transaction identifier, recorded on every Lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// A fresh random id. Ids must be unique across processes because Locks
    /// written by different sessions are compared by id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
