use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::entity::{Document, EntityKey, TransactionId};
use crate::errors::{AcidError, Result};
use crate::lock::Lock;

/// Represents a single mutation to be applied to an entity's durable record.
///
/// `Mutation` is produced by a resource manager's commit once its Lock is held.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert or replace the record with the given key.
    Put(EntityKey, Value),
    /// Delete the record with the given key.
    /// If no record with the key exists, this mutation should be a no-op.
    Delete(EntityKey),
}

impl Mutation {
    pub fn key(&self) -> &EntityKey {
        match self {
            Mutation::Put(key, _) | Mutation::Delete(key) => key,
        }
    }
}

/// Backend storage adapter, implemented once per datastore technology.
///
/// The backend only has to be atomic per entity. What makes multi-entity
/// transactions possible is [`Datastore::try_lock`], which must be a
/// conditional (check-and-set) write keyed by entity identity that is visible
/// to every process sharing the datastore.
///
/// Implementations must be `Send` and `Sync`; many sessions use one backend
/// concurrently.
///
/// # Examples
///
/// The bundled [`MemoryDatastore`] is enough for tests and single-process use:
///
/// ```
/// use acidhouse::prelude::*;
/// use serde_json::json;
///
/// let datastore = MemoryDatastore::new();
/// let key = EntityKey::new("Account", "a-1");
/// datastore.apply_mutations(vec![Mutation::Put(key.clone(), json!({"id": "a-1"}))]).unwrap();
/// assert!(datastore.read(&key).unwrap().is_some());
/// ```
pub trait Datastore: Send + Sync {
    /// Reads the last committed value of an entity.
    fn read(&self, key: &EntityKey) -> Result<Option<Value>>;

    /// Every committed entity of a kind, in key order.
    fn scan(&self, kind: &str) -> Result<Vec<Document>>;

    /// Applies mutations. Each mutation touches a single entity and must be
    /// atomic on its own; no atomicity across mutations is required.
    fn apply_mutations(&self, mutations: Vec<Mutation>) -> Result<()>;

    /// Creates `lock` unless a Lock for the same entity exists.
    ///
    /// Re-acquiring a Lock already held by the same transaction succeeds.
    /// A Lock held by another transaction fails with
    /// [`AcidError::ConcurrentModification`]; implementations must fail fast
    /// rather than wait.
    fn try_lock(&self, lock: Lock) -> Result<()>;

    /// The Lock currently held on an entity, if any.
    fn lock(&self, key: &EntityKey) -> Result<Option<Lock>>;

    /// Deletes the Lock on `key` if `transaction` holds it. Absent Locks and
    /// Locks held by other transactions are left alone.
    fn unlock(&self, key: &EntityKey, transaction: &TransactionId) -> Result<()>;

    /// Every Lock in the datastore. Operator inspection only.
    fn locks(&self) -> Result<Vec<Lock>>;

    /// Deletes the Lock on `key` whoever holds it. Manual recovery only.
    fn break_lock(&self, key: &EntityKey) -> Result<Option<Lock>>;
}

/// In-process [`Datastore`] backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    records: RwLock<HashMap<EntityKey, Value>>,
    locks: RwLock<HashMap<EntityKey, Lock>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records across all kinds.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Datastore for MemoryDatastore {
    fn read(&self, key: &EntityKey) -> Result<Option<Value>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn scan(&self, kind: &str) -> Result<Vec<Document>> {
        let records = self.records.read();
        let mut documents: Vec<Document> = records
            .iter()
            .filter(|(key, _)| key.kind() == kind)
            .map(|(key, body)| Document::new(key.clone(), body.clone()))
            .collect();
        documents.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(documents)
    }

    fn apply_mutations(&self, mutations: Vec<Mutation>) -> Result<()> {
        let mut records = self.records.write();
        for mutation in mutations {
            match mutation {
                Mutation::Put(key, body) => {
                    records.insert(key, body);
                }
                Mutation::Delete(key) => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn try_lock(&self, lock: Lock) -> Result<()> {
        let mut locks = self.locks.write();
        if let Some(existing) = locks.get(lock.id()) {
            if existing.is_held_by(lock.transaction()) {
                return Ok(());
            }
            return Err(AcidError::ConcurrentModification {
                key: lock.id().clone(),
                holder: existing.transaction().clone(),
            });
        }
        locks.insert(lock.id().clone(), lock);
        Ok(())
    }

    fn lock(&self, key: &EntityKey) -> Result<Option<Lock>> {
        Ok(self.locks.read().get(key).cloned())
    }

    fn unlock(&self, key: &EntityKey, transaction: &TransactionId) -> Result<()> {
        let mut locks = self.locks.write();
        if locks.get(key).is_some_and(|lock| lock.is_held_by(transaction)) {
            locks.remove(key);
        }
        Ok(())
    }

    fn locks(&self) -> Result<Vec<Lock>> {
        let mut locks: Vec<Lock> = self.locks.read().values().cloned().collect();
        locks.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(locks)
    }

    fn break_lock(&self, key: &EntityKey) -> Result<Option<Lock>> {
        Ok(self.locks.write().remove(key))
    }
}
