use std::fmt;
use std::marker::PhantomData;

use ahash::AHashMap as HashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::entity::{Entity, EntityKey};
use crate::errors::{AcidError, Result};

/// Typed accessor for a (possibly nested) field of an entity document.
///
/// Nested fields of embedded entities are addressed by their path from the
/// document root, so `Property::new("address").nested("city")` reads
/// `body["address"]["city"]`.
pub struct Property<T> {
    path: Vec<String>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.path.join(".")).finish()
    }
}

impl<T> fmt::Display for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("."))
    }
}

impl<T> Property<T> {
    /// A property addressed by a dotted path, e.g. `"address.city"`.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.split('.').map(str::to_string).collect(),
            _value: PhantomData,
        }
    }

    /// A child property of an embedded entity.
    pub fn nested<U>(&self, name: &str) -> Property<U> {
        let mut path = self.path.clone();
        path.push(name.to_string());
        Property {
            path,
            _value: PhantomData,
        }
    }

    /// The last path segment.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The raw JSON value at this path, if every segment exists.
    pub fn raw<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        self.path
            .iter()
            .try_fold(body, |value, segment| value.as_object()?.get(segment))
    }
}

impl<T: DeserializeOwned> Property<T> {
    /// Reads the field. `Ok(None)` when the field (or a parent) is absent or null.
    pub fn get(&self, body: &Value) -> Result<Option<T>> {
        match self.raw(body) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }
}

impl<T: Serialize> Property<T> {
    /// Writes the field, creating intermediate embedded objects as needed.
    pub fn set(&self, body: &mut Value, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)?;
        let (last, parents) = self
            .path
            .split_last()
            .ok_or_else(|| AcidError::InvalidArgument("empty property path".to_string()))?;

        let mut target = body;
        for segment in parents {
            let object = as_object_mut(target, segment)?;
            target = object
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        as_object_mut(target, last)?.insert(last.clone(), encoded);
        Ok(())
    }
}

fn as_object_mut<'a>(value: &'a mut Value, segment: &str) -> Result<&'a mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut().ok_or_else(|| {
        AcidError::InvalidArgument(format!("cannot address field [{segment}] inside a non-object"))
    })
}

/// Metadata for one entity kind: its name and where its identity lives.
#[derive(Debug, Clone)]
pub struct Metamodel {
    kind: String,
    key: Property<Value>,
}

impl Metamodel {
    pub fn new(kind: &str, key_path: &str) -> Self {
        Self {
            kind: kind.to_string(),
            key: Property::new(key_path),
        }
    }

    pub fn of<E: Entity>() -> Self {
        Self::new(E::KIND, E::KEY)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key(&self) -> &Property<Value> {
        &self.key
    }

    /// Resolves the identity of a document of this kind. Strings and
    /// integers are accepted as key values.
    pub fn resolve_identity(&self, body: &Value) -> Result<EntityKey> {
        let id = match self.key.raw(body) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => {
                return Err(AcidError::MissingIdentity {
                    kind: self.kind.clone(),
                    path: self.key.to_string(),
                });
            }
        };
        Ok(EntityKey::new(self.kind.clone(), id))
    }
}

/// Registry of entity metadata, built once and shared read-only by sessions.
#[derive(Debug, Clone, Default)]
pub struct Metamodels {
    models: HashMap<String, Metamodel>,
}

impl Metamodels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type. Re-registering a kind replaces its metadata.
    pub fn register<E: Entity>(mut self) -> Self {
        self.models.insert(E::KIND.to_string(), Metamodel::of::<E>());
        self
    }

    pub fn get(&self, kind: &str) -> Result<&Metamodel> {
        self.models.get(kind).ok_or_else(|| AcidError::UnknownEntity {
            kind: kind.to_string(),
        })
    }

    pub fn resolve_identity(&self, kind: &str, body: &Value) -> Result<EntityKey> {
        self.get(kind)?.resolve_identity(body)
    }

    /// Encodes an entity and resolves its identity.
    pub fn document<E: Entity>(&self, entity: &E) -> Result<crate::entity::Document> {
        let body = serde_json::to_value(entity)?;
        let key = self.resolve_identity(E::KIND, &body)?;
        Ok(crate::entity::Document::new(key, body))
    }
}
