use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use ahash::AHashMap as HashMap;
use log::{debug, error, info, warn};

use crate::entity::{Document, EntityKey, TransactionId};
use crate::errors::{AcidError, IndoubtReport, Result};
use crate::resource::ResourceManager;
use crate::wal::{LogEntry, LogState, Operation};

/// Creates the resource manager for an entity the first time a transaction
/// touches it.
pub type ManagerFactory<R> = Box<dyn Fn(&EntityKey, &TransactionId) -> R + Send + Sync>;

/// Lifecycle of a coordinator. Everything but `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorStatus {
    Active,
    Committed,
    RolledBack,
    /// Commit failed after at least one participant committed.
    Indoubt,
}

struct Enlisted {
    index: usize,
    created: bool,
}

struct Participant<R> {
    manager: R,
    prepared: bool,
    committed: bool,
}

/// Two-phase commit coordinator for one transaction.
///
/// Every transactional operation is forwarded here. The coordinator creates
/// one [`ResourceManager`] per distinct entity, in order of first touch, and
/// appends a [`LogEntry`] for each operation before any I/O is done.
///
/// [`commit`](Coordinator::commit) prepares every participant and then
/// commits every participant, both in registration order:
///
/// * a failure before any participant committed releases every Lock taken and
///   returns the original error;
/// * a failure after a participant committed stops immediately, leaves the
///   remaining participants untouched and returns [`AcidError::Indoubt`]
///   carrying the log.
///
/// A coordinator serves a single logical thread of control.
pub struct Coordinator<R: ResourceManager> {
    id: TransactionId,
    sequence: Arc<AtomicU64>,
    factory: ManagerFactory<R>,
    parallel_prepare: bool,
    participants: Vec<Participant<R>>,
    index: HashMap<EntityKey, usize>,
    logs: Vec<LogEntry>,
    status: CoordinatorStatus,
}

impl<R: ResourceManager> Coordinator<R> {
    /// Creates a coordinator for transaction `id`. `sequence` numbers the log
    /// entries and is shared by all coordinators of one session.
    pub fn new(id: TransactionId, sequence: Arc<AtomicU64>, factory: ManagerFactory<R>) -> Self {
        debug!("Transaction [{}] started", id);
        Self {
            id,
            sequence,
            factory,
            parallel_prepare: false,
            participants: Vec::new(),
            index: HashMap::new(),
            logs: Vec::new(),
            status: CoordinatorStatus::Active,
        }
    }

    /// Issues prepare calls to all participants concurrently. Every result
    /// is collected before the commit phase starts.
    pub fn with_parallel_prepare(mut self, parallel_prepare: bool) -> Self {
        self.parallel_prepare = parallel_prepare;
        self
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == CoordinatorStatus::Active
    }

    /// The write-ahead log in sequence order.
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Participating entities in registration order.
    pub fn participants(&self) -> Vec<&EntityKey> {
        self.participants.iter().map(|p| p.manager.key()).collect()
    }

    pub fn get(&mut self, key: &EntityKey) -> Result<Option<Document>> {
        let enlisted = self.enlist(key, Operation::Get)?;
        let result = self.participants[enlisted.index].manager.get(key);
        self.settle(enlisted, result)
    }

    pub fn put(&mut self, entity: Document) -> Result<()> {
        let enlisted = self.enlist(entity.key(), Operation::Put)?;
        let result = self.participants[enlisted.index].manager.put(entity);
        self.settle(enlisted, result)
    }

    pub fn update(&mut self, entity: Document) -> Result<()> {
        let enlisted = self.enlist(entity.key(), Operation::Update)?;
        let result = self.participants[enlisted.index].manager.update(entity);
        self.settle(enlisted, result)
    }

    pub fn delete(&mut self, entity: Document) -> Result<()> {
        let enlisted = self.enlist(entity.key(), Operation::Delete)?;
        let result = self.participants[enlisted.index].manager.delete(entity);
        self.settle(enlisted, result)
    }

    /// Finds or creates the participant for `key` and logs the operation.
    fn enlist(&mut self, key: &EntityKey, operation: Operation) -> Result<Enlisted> {
        if !self.is_active() {
            return Err(AcidError::TransactionClosed { id: self.id.clone() });
        }
        let (index, created) = match self.index.get(key) {
            Some(&i) => (i, false),
            None => {
                let manager = (self.factory)(key, &self.id);
                self.participants.push(Participant {
                    manager,
                    prepared: false,
                    committed: false,
                });
                let i = self.participants.len() - 1;
                self.index.insert(key.clone(), i);
                debug!("Transaction [{}] enlisted [{}]", self.id, key);
                (i, true)
            }
        };
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.logs.push(LogEntry::new(sequence, operation, key.clone()));
        Ok(Enlisted { index, created })
    }

    /// Undoes `enlist` when the manager rejected the operation, so a rejected
    /// call neither takes part in the commit nor shows up in the log.
    fn settle<T>(&mut self, enlisted: Enlisted, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.logs.pop();
            if enlisted.created {
                if let Some(participant) = self.participants.pop() {
                    self.index.remove(participant.manager.key());
                    debug!(
                        "Transaction [{}] dropped [{}] after a rejected operation",
                        self.id,
                        participant.manager.key()
                    );
                }
            }
        }
        result
    }

    /// Commits every operation of the transaction with two-phase commit.
    ///
    /// Calling it on a finished coordinator does nothing.
    pub fn commit(&mut self) -> Result<()> {
        if !self.is_active() {
            debug!("Transaction [{}] already {:?}; commit ignored", self.id, self.status);
            return Ok(());
        }

        // Phase 1
        let prepared = if self.parallel_prepare {
            self.prepare_concurrently()
        } else {
            self.prepare_in_order()
        };
        if let Err(cause) = prepared {
            warn!("Transaction [{}] failed to prepare: {}", self.id, cause);
            self.abort();
            return Err(cause);
        }

        // Phase 2
        let mut committed = 0;
        for i in 0..self.participants.len() {
            let participant = &mut self.participants[i];
            if let Err(cause) = participant.manager.commit() {
                if committed == 0 {
                    warn!("Transaction [{}] failed before any commit: {}", self.id, cause);
                    self.abort();
                    return Err(cause);
                }
                self.status = CoordinatorStatus::Indoubt;
                let report = IndoubtReport::new(self.id.clone(), self.logs.clone());
                error!("{report}");
                return Err(AcidError::Indoubt {
                    report,
                    cause: Box::new(cause),
                });
            }
            participant.committed = true;
            committed += 1;
            let key = participant.manager.key().clone();
            advance(&mut self.logs, &key, LogState::Committed)?;
        }

        info!("Transaction [{}] committed {} entities", self.id, committed);
        self.finish(CoordinatorStatus::Committed);
        Ok(())
    }

    fn prepare_in_order(&mut self) -> Result<()> {
        for participant in &mut self.participants {
            participant.manager.prepare()?;
            participant.prepared = true;
            advance(&mut self.logs, participant.manager.key(), LogState::Prepared)?;
        }
        Ok(())
    }

    fn prepare_concurrently(&mut self) -> Result<()> {
        let results: Vec<Result<()>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .participants
                .iter_mut()
                .map(|participant| scope.spawn(move || participant.manager.prepare()))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(AcidError::Storage("prepare panicked".to_string())))
                })
                .collect()
        });

        // Record every success before reporting the first failure, so the
        // abort releases all Locks that were taken.
        let mut first_failure = None;
        for (participant, result) in self.participants.iter_mut().zip(results) {
            match result {
                Ok(()) => {
                    participant.prepared = true;
                    advance(&mut self.logs, participant.manager.key(), LogState::Prepared)?;
                }
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Rolls back every operation of the transaction. Participants that
    /// already committed are never contacted.
    ///
    /// Calling it on a finished coordinator does nothing.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.is_active() {
            debug!("Transaction [{}] already {:?}; rollback ignored", self.id, self.status);
            return Ok(());
        }
        let result = self.release();
        self.finish(CoordinatorStatus::RolledBack);
        info!("Transaction [{}] rolled back", self.id);
        result
    }

    fn abort(&mut self) {
        // Release errors are logged by `release`; the caller gets the first failure.
        let _ = self.release();
        self.finish(CoordinatorStatus::RolledBack);
    }

    /// Rolls back every participant that has not committed. Returns the
    /// first failure after trying all of them.
    fn release(&mut self) -> Result<()> {
        let mut first_failure = None;
        for participant in self.participants.iter_mut().filter(|p| !p.committed) {
            if let Err(e) = participant.manager.rollback() {
                warn!(
                    "Transaction [{}] could not release [{}]: {}",
                    self.id,
                    participant.manager.key(),
                    e
                );
                first_failure.get_or_insert(e);
            } else if participant.prepared {
                debug!("Transaction [{}] released [{}]", self.id, participant.manager.key());
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn finish(&mut self, status: CoordinatorStatus) {
        self.status = status;
        self.participants.clear();
        self.index.clear();
        self.logs.clear();
    }
}

fn advance(logs: &mut [LogEntry], key: &EntityKey, state: LogState) -> Result<()> {
    for log in logs.iter_mut().filter(|log| log.entity() == key) {
        log.advance(state)?;
    }
    Ok(())
}
