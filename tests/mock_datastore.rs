//! A fault-injecting datastore for testing failure paths of the commit protocol.
//!
//! Wraps a [`MemoryDatastore`] and fails writes or lock acquisitions for
//! chosen entities, simulating a backend that goes away part-way through a
//! transaction.
#![allow(dead_code)]

use ahash::AHashSet as HashSet;
use parking_lot::Mutex;
use serde_json::Value;

use acidhouse::{
    AcidError, Document, EntityKey, Lock, Result, TransactionId,
    storage::{Datastore, MemoryDatastore, Mutation},
};

#[derive(Debug, Default)]
pub struct FaultyDatastore {
    inner: MemoryDatastore,
    failing_writes: Mutex<HashSet<EntityKey>>,
    failing_locks: Mutex<HashSet<EntityKey>>,
}

impl FaultyDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write of `key` fail.
    pub fn fail_writes_on(&self, key: EntityKey) {
        self.failing_writes.lock().insert(key);
    }

    /// Makes every later lock acquisition on `key` fail with a storage error.
    pub fn fail_locks_on(&self, key: EntityKey) {
        self.failing_locks.lock().insert(key);
    }

    pub fn heal(&self) {
        self.failing_writes.lock().clear();
        self.failing_locks.lock().clear();
    }

    pub fn inner(&self) -> &MemoryDatastore {
        &self.inner
    }
}

impl Datastore for FaultyDatastore {
    fn read(&self, key: &EntityKey) -> Result<Option<Value>> {
        self.inner.read(key)
    }

    fn scan(&self, kind: &str) -> Result<Vec<Document>> {
        self.inner.scan(kind)
    }

    fn apply_mutations(&self, mutations: Vec<Mutation>) -> Result<()> {
        let failing = self.failing_writes.lock();
        if let Some(mutation) = mutations.iter().find(|m| failing.contains(m.key())) {
            return Err(AcidError::Storage(format!(
                "injected write failure on [{}]",
                mutation.key()
            )));
        }
        drop(failing);
        self.inner.apply_mutations(mutations)
    }

    fn try_lock(&self, lock: Lock) -> Result<()> {
        if self.failing_locks.lock().contains(lock.id()) {
            return Err(AcidError::Storage(format!(
                "injected lock failure on [{}]",
                lock.id()
            )));
        }
        self.inner.try_lock(lock)
    }

    fn lock(&self, key: &EntityKey) -> Result<Option<Lock>> {
        self.inner.lock(key)
    }

    fn unlock(&self, key: &EntityKey, transaction: &TransactionId) -> Result<()> {
        self.inner.unlock(key, transaction)
    }

    fn locks(&self) -> Result<Vec<Lock>> {
        self.inner.locks()
    }

    fn break_lock(&self, key: &EntityKey) -> Result<Option<Lock>> {
        self.inner.break_lock(key)
    }
}
