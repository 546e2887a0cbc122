use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;

use crate::entity::{Document, EntityKey, TransactionId};
use crate::errors::{AcidError, IndoubtReport, Result};
use crate::lock::Lock;
use crate::storage::{Datastore, Mutation};

/// The local half of the two-phase commit protocol for one entity.
///
/// A `ResourceManager` owns one managed entity's connection to its backing
/// store for the lifetime of a transaction. Operations are buffered; nothing
/// durable happens until [`prepare`](ResourceManager::prepare) writes the
/// entity's Lock and [`commit`](ResourceManager::commit) applies the buffered
/// write and deletes the Lock.
///
/// Exactly one manager exists per distinct entity per transaction and the
/// coordinator is its only caller. Implementations are `Send` so the
/// coordinator may prepare independent participants concurrently.
pub trait ResourceManager: Send {
    /// Transaction context the manager is bound to.
    type Transaction: Clone + fmt::Debug + Send;

    /// Identity of the managed entity.
    fn key(&self) -> &EntityKey;

    /// Reads the managed entity, seeing this transaction's own buffered writes.
    ///
    /// # Errors
    ///
    /// [`AcidError::ConcurrentModification`] if another transaction holds the
    /// entity's Lock, [`AcidError::Indoubt`] if the state found indicates a
    /// coordinator crashed part-way through committing it.
    fn get(&mut self, key: &EntityKey) -> Result<Option<Document>>;

    /// Buffers the creation of the entity.
    fn put(&mut self, entity: Document) -> Result<()>;

    /// Buffers a replacement of the entity.
    fn update(&mut self, entity: Document) -> Result<()>;

    /// Buffers the deletion of the entity.
    fn delete(&mut self, entity: Document) -> Result<()>;

    /// Phase 1: acquires the entity's Lock for the bound transaction. Writes
    /// nothing but the Lock. Fails fast if another transaction holds it.
    fn prepare(&mut self) -> Result<()>;

    /// Phase 2: applies the buffered write then deletes the Lock. Calling it
    /// again after success is a no-op.
    fn commit(&mut self) -> Result<()>;

    /// Releases the Lock if held and discards the buffered write. Does
    /// nothing once committed.
    fn rollback(&mut self) -> Result<()>;

    /// The managed entity as buffered so far. `None` if absent or deleted.
    fn entity(&self) -> Option<&Document>;

    /// The bound transaction, or `None` once the manager is detached.
    fn transaction(&self) -> Option<&Self::Transaction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Prepared,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq)]
enum Pending {
    /// Create; the entity must still be absent when the Lock is taken.
    Insert(Value),
    Replace(Value),
    Remove,
}

/// [`ResourceManager`] for any [`Datastore`] backend.
pub struct DatastoreResourceManager<D: Datastore> {
    datastore: Arc<D>,
    key: EntityKey,
    transaction: Option<TransactionId>,
    stale_lock_after: Option<Duration>,
    entity: Option<Document>,
    pending: Option<Pending>,
    phase: Phase,
}

impl<D: Datastore> DatastoreResourceManager<D> {
    pub fn new(
        datastore: Arc<D>,
        key: EntityKey,
        transaction: TransactionId,
        stale_lock_after: Option<Duration>,
    ) -> Self {
        Self {
            datastore,
            key,
            transaction: Some(transaction),
            stale_lock_after,
            entity: None,
            pending: None,
            phase: Phase::Active,
        }
    }

    fn bound_transaction(&self) -> Result<&TransactionId> {
        self.transaction
            .as_ref()
            .ok_or_else(|| AcidError::InvalidArgument(format!("[{}] is not attached to a transaction", self.key)))
    }

    fn ensure_active(&self, entity: &EntityKey) -> Result<()> {
        if entity != &self.key {
            return Err(AcidError::InvalidArgument(format!(
                "manager for [{}] cannot handle [{}]",
                self.key, entity
            )));
        }
        if self.phase != Phase::Active {
            return Err(AcidError::InvalidArgument(format!(
                "[{}] can no longer be modified in this transaction",
                self.key
            )));
        }
        Ok(())
    }

    /// Whether the entity exists from this transaction's point of view.
    fn exists(&self) -> Result<bool> {
        match &self.pending {
            Some(Pending::Insert(_)) | Some(Pending::Replace(_)) => Ok(true),
            Some(Pending::Remove) => Ok(false),
            None => Ok(self.datastore.read(&self.key)?.is_some()),
        }
    }

    /// Fails if another transaction holds the entity's Lock.
    fn check_foreign_lock(&self, own: &TransactionId) -> Result<()> {
        let Some(lock) = self.datastore.lock(&self.key)? else {
            return Ok(());
        };
        if lock.is_held_by(own) {
            return Ok(());
        }
        let conflict = AcidError::ConcurrentModification {
            key: self.key.clone(),
            holder: lock.transaction().clone(),
        };
        match self.stale_lock_after {
            Some(threshold) if lock.is_stale(threshold, Utc::now()) => {
                warn!(
                    "Entity [{}] is held by stale lock of transaction [{}] since {}",
                    self.key,
                    lock.transaction(),
                    lock.timestamp()
                );
                Err(AcidError::Indoubt {
                    report: IndoubtReport::new(lock.transaction().clone(), Vec::new()),
                    cause: Box::new(conflict),
                })
            }
            _ => Err(conflict),
        }
    }
}

impl<D: Datastore> ResourceManager for DatastoreResourceManager<D> {
    type Transaction = TransactionId;

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn get(&mut self, key: &EntityKey) -> Result<Option<Document>> {
        if key != &self.key {
            return Err(AcidError::InvalidArgument(format!(
                "manager for [{}] cannot read [{}]",
                self.key, key
            )));
        }
        if self.pending.is_some() {
            return Ok(self.entity.clone());
        }
        let own = self.bound_transaction()?.clone();
        self.check_foreign_lock(&own)?;
        self.entity = self
            .datastore
            .read(&self.key)?
            .map(|body| Document::new(self.key.clone(), body));
        Ok(self.entity.clone())
    }

    fn put(&mut self, entity: Document) -> Result<()> {
        self.ensure_active(entity.key())?;
        if self.exists()? {
            return Err(AcidError::EntityExists { key: self.key.clone() });
        }
        let body = entity.body().clone();
        // Re-creating an entity removed earlier in this transaction replaces it.
        self.pending = Some(match self.pending {
            Some(Pending::Remove) => Pending::Replace(body),
            _ => Pending::Insert(body),
        });
        self.entity = Some(entity);
        Ok(())
    }

    fn update(&mut self, entity: Document) -> Result<()> {
        self.ensure_active(entity.key())?;
        if !self.exists()? {
            return Err(AcidError::EntityNotFound { key: self.key.clone() });
        }
        let body = entity.body().clone();
        self.pending = Some(match self.pending {
            Some(Pending::Insert(_)) => Pending::Insert(body),
            _ => Pending::Replace(body),
        });
        self.entity = Some(entity);
        Ok(())
    }

    fn delete(&mut self, entity: Document) -> Result<()> {
        self.ensure_active(entity.key())?;
        self.pending = Some(Pending::Remove);
        self.entity = None;
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        match self.phase {
            Phase::Prepared => return Ok(()),
            Phase::Active => {}
            Phase::Committed | Phase::RolledBack => {
                return Err(AcidError::InvalidArgument(format!(
                    "[{}] has already finished",
                    self.key
                )));
            }
        }
        let transaction = self.bound_transaction()?.clone();
        match self
            .datastore
            .try_lock(Lock::acquire(self.key.clone(), transaction.clone()))
        {
            Ok(()) => {}
            Err(e @ AcidError::ConcurrentModification { .. }) => return Err(e),
            Err(e) => {
                return Err(AcidError::PrepareFailure {
                    key: self.key.clone(),
                    reason: e.to_string(),
                });
            }
        }
        self.phase = Phase::Prepared;

        if matches!(self.pending, Some(Pending::Insert(_))) && self.datastore.read(&self.key)?.is_some() {
            // Created by someone else since it was buffered.
            self.datastore.unlock(&self.key, &transaction)?;
            self.phase = Phase::Active;
            return Err(AcidError::EntityExists { key: self.key.clone() });
        }
        debug!("Prepared [{}] for transaction [{}]", self.key, transaction);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        match self.phase {
            Phase::Committed => return Ok(()),
            Phase::Prepared => {}
            Phase::Active | Phase::RolledBack => {
                return Err(AcidError::InvalidArgument(format!(
                    "[{}] must be prepared before commit",
                    self.key
                )));
            }
        }
        let transaction = self.bound_transaction()?.clone();
        let mutation = match self.pending.take() {
            Some(Pending::Insert(body)) | Some(Pending::Replace(body)) => {
                Some(Mutation::Put(self.key.clone(), body))
            }
            Some(Pending::Remove) => Some(Mutation::Delete(self.key.clone())),
            None => None,
        };
        if let Some(mutation) = mutation {
            if let Err(e) = self.datastore.apply_mutations(vec![mutation.clone()]) {
                // Keep the write buffered so a retry or rollback sees it.
                self.pending = match mutation {
                    Mutation::Put(_, body) => Some(Pending::Replace(body)),
                    Mutation::Delete(_) => Some(Pending::Remove),
                };
                return Err(e);
            }
        }
        self.phase = Phase::Committed;
        self.transaction = None;

        // The write is durable; a Lock left behind only blocks later writers
        // until an operator breaks it.
        if let Err(e) = self.datastore.unlock(&self.key, &transaction) {
            warn!(
                "Committed [{}] but could not release its lock for transaction [{}]: {}",
                self.key, transaction, e
            );
        }
        debug!("Committed [{}] for transaction [{}]", self.key, transaction);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        match self.phase {
            Phase::Committed | Phase::RolledBack => return Ok(()),
            Phase::Prepared => {
                let transaction = self.bound_transaction()?.clone();
                self.datastore.unlock(&self.key, &transaction)?;
            }
            Phase::Active => {}
        }
        self.pending = None;
        self.entity = None;
        self.phase = Phase::RolledBack;
        self.transaction = None;
        Ok(())
    }

    fn entity(&self) -> Option<&Document> {
        self.entity.as_ref()
    }

    fn transaction(&self) -> Option<&TransactionId> {
        self.transaction.as_ref()
    }
}
