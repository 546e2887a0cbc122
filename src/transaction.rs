use std::sync::Arc;

use parking_lot::Mutex;

use crate::coordinator::{Coordinator, CoordinatorStatus};
use crate::entity::TransactionId;
use crate::errors::Result;
use crate::resource::ResourceManager;

/// Client handle on a transaction started by a `Session`.
///
/// A transaction is bound 1:1 to a [`Coordinator`]; `commit` and `rollback`
/// delegate to it. Both are idempotent so that the usual pattern of calling
/// `rollback` unconditionally from failure handlers is safe even after a
/// successful commit:
///
/// ```
/// use acidhouse::prelude::*;
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Serialize, Deserialize)]
/// struct Entity1 { id: String, i: i64 }
///
/// impl Entity for Entity1 {
///     const KIND: &'static str = "Entity1";
///     const KEY: &'static str = "id";
/// }
///
/// let session = Session::new(
///     Arc::new(MemoryDatastore::new()),
///     Arc::new(Metamodels::new().register::<Entity1>()),
///     SessionConfig::default(),
/// );
/// let transaction = session.begin_transaction().unwrap();
/// let outcome = session
///     .put(&Entity1 { id: "Key11".to_string(), i: 11 })
///     .and_then(|_| transaction.commit());
/// if outcome.is_err() {
///     transaction.rollback().unwrap();
/// }
/// transaction.rollback().unwrap(); // no-op after commit
/// session.close().unwrap();
/// ```
pub struct Transaction<R: ResourceManager> {
    id: TransactionId,
    coordinator: Arc<Mutex<Coordinator<R>>>,
}

impl<R: ResourceManager> Transaction<R> {
    pub fn new(coordinator: Arc<Mutex<Coordinator<R>>>) -> Self {
        let id = coordinator.lock().id().clone();
        Self { id, coordinator }
    }

    /// Returns the unique identifier of the transaction.
    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.lock().status()
    }

    pub fn is_active(&self) -> bool {
        self.coordinator.lock().is_active()
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// The original error if a participant could not be prepared (every Lock
    /// taken is released first), or [`AcidError::Indoubt`](crate::AcidError::Indoubt)
    /// if the commit phase failed after some participants committed.
    pub fn commit(&self) -> Result<()> {
        self.coordinator.lock().commit()
    }

    /// Rolls back the transaction. A no-op once it has finished.
    pub fn rollback(&self) -> Result<()> {
        self.coordinator.lock().rollback()
    }
}
