use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::{ReadPolicy, SessionConfig};
use crate::coordinator::{Coordinator, ManagerFactory};
use crate::entity::{Document, Entity, EntityKey, TransactionId};
use crate::errors::{AcidError, Result};
use crate::lock::Lock;
use crate::metamodel::Metamodels;
use crate::query::{Aggregation, Delete, GetList, GetScalar, Update};
use crate::resource::DatastoreResourceManager;
use crate::storage::Datastore;
use crate::transaction::Transaction;

/// Transaction handle returned by [`Session::begin_transaction`].
pub type SessionTransaction<D> = Transaction<DatastoreResourceManager<D>>;

pub(crate) type SharedCoordinator<D> = Arc<Mutex<Coordinator<DatastoreResourceManager<D>>>>;

/// Client entry point to one datastore.
///
/// Reads outside a transaction go straight to the datastore, subject to the
/// configured [`ReadPolicy`]. Writes are only accepted while a transaction
/// begun on this session is open and are forwarded to its coordinator; a
/// `put` without one fails with `EntityExists`. At most one transaction is
/// open per session at a time.
pub struct Session<D: Datastore + 'static> {
    datastore: Arc<D>,
    metamodels: Arc<Metamodels>,
    config: SessionConfig,
    sequence: Arc<AtomicU64>,
    current: Mutex<Option<SharedCoordinator<D>>>,
}

impl<D: Datastore + 'static> Session<D> {
    pub fn new(datastore: Arc<D>, metamodels: Arc<Metamodels>, config: SessionConfig) -> Self {
        Self {
            datastore,
            metamodels,
            config,
            sequence: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(None),
        }
    }

    pub fn datastore(&self) -> &Arc<D> {
        &self.datastore
    }

    pub fn metamodels(&self) -> &Metamodels {
        &self.metamodels
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts a transaction bound to a fresh coordinator.
    ///
    /// # Errors
    ///
    /// [`AcidError::TransactionActive`] while the previous transaction of this
    /// session has neither committed nor rolled back.
    pub fn begin_transaction(&self) -> Result<SessionTransaction<D>> {
        let mut current = self.current.lock();
        let open = current.as_ref().and_then(|shared| {
            let coordinator = shared.lock();
            coordinator.is_active().then(|| coordinator.id().clone())
        });
        if let Some(id) = open {
            return Err(AcidError::TransactionActive { id });
        }

        let datastore = Arc::clone(&self.datastore);
        let stale_lock_after = self.config.stale_lock_after;
        let factory: ManagerFactory<DatastoreResourceManager<D>> =
            Box::new(move |key: &EntityKey, transaction: &TransactionId| {
                DatastoreResourceManager::new(
                    Arc::clone(&datastore),
                    key.clone(),
                    transaction.clone(),
                    stale_lock_after,
                )
            });
        let coordinator = Coordinator::new(TransactionId::generate(), Arc::clone(&self.sequence), factory)
            .with_parallel_prepare(self.config.parallel_prepare);
        let shared = Arc::new(Mutex::new(coordinator));
        *current = Some(Arc::clone(&shared));
        Ok(Transaction::new(shared))
    }

    /// Closes the session, rolling back the open transaction if any.
    pub fn close(self) -> Result<()> {
        let Some(shared) = self.current.into_inner() else {
            return Ok(());
        };
        let mut coordinator = shared.lock();
        if coordinator.is_active() {
            debug!("Closing session with open transaction [{}]", coordinator.id());
        }
        coordinator.rollback()
    }

    /// Reads an entity by identity.
    ///
    /// Inside a transaction the read goes through the coordinator and sees the
    /// transaction's own writes.
    pub fn get<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        self.metamodels.get(E::KIND)?;
        let key = EntityKey::of::<E>(id);
        let document = match self.active_coordinator() {
            Some(shared) => {
                let mut coordinator = shared.lock();
                coordinator.get(&key)?
            }
            None => self.read(&key)?.map(|body| Document::new(key.clone(), body)),
        };
        document.map(|document| document.decode::<E>()).transpose()
    }

    /// Creates an entity in the open transaction.
    ///
    /// # Errors
    ///
    /// [`AcidError::EntityExists`] without an open transaction, or if the
    /// identity is already taken.
    pub fn put<E: Entity>(&self, entity: &E) -> Result<()> {
        let document = self.metamodels.document(entity)?;
        let Some(shared) = self.active_coordinator() else {
            return Err(AcidError::EntityExists {
                key: document.key().clone(),
            });
        };
        let mut coordinator = shared.lock();
        coordinator.put(document)
    }

    /// Replaces an existing entity in the open transaction.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<()> {
        let document = self.metamodels.document(entity)?;
        let shared = self.transactional()?;
        let mut coordinator = shared.lock();
        coordinator.update(document)
    }

    /// Deletes an entity in the open transaction. Deleting an absent entity
    /// does nothing.
    pub fn delete<E: Entity>(&self, entity: &E) -> Result<()> {
        let document = self.metamodels.document(entity)?;
        let shared = self.transactional()?;
        let mut coordinator = shared.lock();
        coordinator.delete(document)
    }

    pub fn list<E: Entity>(&self) -> GetList<'_, D, E> {
        GetList::new(self)
    }

    /// Aggregates a property over the entities of kind `E`.
    pub fn scalar<E: Entity, A: Aggregation>(&self, aggregation: A) -> GetScalar<'_, D, A> {
        GetScalar::new(self, E::KIND, aggregation)
    }

    pub fn update_where<E: Entity>(&self) -> Update<'_, D, E> {
        Update::new(self)
    }

    pub fn delete_where<E: Entity>(&self) -> Delete<'_, D, E> {
        Delete::new(self)
    }

    /// Every live Lock in the datastore.
    pub fn locks(&self) -> Result<Vec<Lock>> {
        self.datastore.locks()
    }

    /// Deletes the Lock on `key` whoever holds it. For manual recovery of
    /// in-doubt transactions only.
    pub fn break_lock(&self, key: &EntityKey) -> Result<Option<Lock>> {
        let broken = self.datastore.break_lock(key)?;
        if let Some(lock) = &broken {
            warn!(
                "Broke lock on [{}] held by transaction [{}] since {}",
                key,
                lock.transaction(),
                lock.timestamp()
            );
        }
        Ok(broken)
    }

    pub(crate) fn active_coordinator(&self) -> Option<SharedCoordinator<D>> {
        self.current
            .lock()
            .as_ref()
            .filter(|shared| shared.lock().is_active())
            .cloned()
    }

    fn transactional(&self) -> Result<SharedCoordinator<D>> {
        self.active_coordinator().ok_or(AcidError::NotInTransaction)
    }

    /// Committed body of one entity, honoring the read policy.
    fn read(&self, key: &EntityKey) -> Result<Option<Value>> {
        if self.config.read_policy == ReadPolicy::FailOnLocked {
            if let Some(lock) = self.datastore.lock(key)? {
                return Err(AcidError::ConcurrentModification {
                    key: key.clone(),
                    holder: lock.transaction().clone(),
                });
            }
        }
        self.datastore.read(key)
    }

    /// Committed documents of one kind, honoring the read policy.
    pub(crate) fn scan(&self, kind: &str) -> Result<Vec<Document>> {
        self.metamodels.get(kind)?;
        let documents = self.datastore.scan(kind)?;
        if self.config.read_policy == ReadPolicy::FailOnLocked {
            let locks = self.datastore.locks()?;
            if let Some(lock) = locks
                .iter()
                .find(|lock| documents.iter().any(|document| document.key() == lock.id()))
            {
                return Err(AcidError::ConcurrentModification {
                    key: lock.id().clone(),
                    holder: lock.transaction().clone(),
                });
            }
        }
        Ok(documents)
    }
}
