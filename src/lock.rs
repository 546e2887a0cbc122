use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{EntityKey, TransactionId};

/// A datastore-resident record proving that a transaction reserved the right
/// to mutate one entity.
///
/// Locks are created by a resource manager's `prepare` through the backend's
/// conditional write and deleted when that manager commits or rolls back. At
/// most one Lock exists per entity identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Identity of the locked entity.
    id: EntityKey,
    /// Transaction holding the lock.
    transaction: TransactionId,
    /// When the lock was allocated. Lets an operator spot locks abandoned by a
    /// crashed coordinator.
    timestamp: DateTime<Utc>,
}

impl Lock {
    pub fn new(id: EntityKey, transaction: TransactionId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            transaction,
            timestamp,
        }
    }

    /// Lock for `id` owned by `transaction`, stamped now.
    pub fn acquire(id: EntityKey, transaction: TransactionId) -> Self {
        Self::new(id, transaction, Utc::now())
    }

    pub fn id(&self) -> &EntityKey {
        &self.id
    }

    pub fn transaction(&self) -> &TransactionId {
        &self.transaction
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_held_by(&self, transaction: &TransactionId) -> bool {
        &self.transaction == transaction
    }

    /// Whether the lock is older than `threshold` at `now`.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(threshold) {
            Ok(threshold) => now.signed_duration_since(self.timestamp) > threshold,
            // Thresholds beyond chrono's range never expire.
            Err(_) => false,
        }
    }
}
