pub mod config;
pub mod coordinator;
pub mod entity;
pub mod errors;
pub mod lock;
pub mod metamodel;
pub mod query;
pub mod resource;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod wal;

// Re-export key types and structs for easier access
pub use config::{ReadPolicy, SessionConfig};
pub use coordinator::{Coordinator, CoordinatorStatus, ManagerFactory};
pub use entity::{Document, Entity, EntityKey, TransactionId};
pub use errors::{AcidError, IndoubtReport, Result};
pub use lock::Lock;
pub use metamodel::{Metamodel, Metamodels, Property};
pub use resource::{DatastoreResourceManager, ResourceManager};
pub use session::{Session, SessionTransaction};
pub use storage::{Datastore, MemoryDatastore, Mutation};
pub use transaction::Transaction;
pub use wal::{LogEntry, LogState, Operation};

/// Everything needed to define entities, open sessions and run transactions.
pub mod prelude {
    pub use crate::config::{ReadPolicy, SessionConfig};
    pub use crate::entity::{Document, Entity, EntityKey, TransactionId};
    pub use crate::errors::AcidError;
    pub use crate::metamodel::{Metamodels, Property};
    pub use crate::query::{Command, Filter, Sort, checked_sum, max, min, sum};
    pub use crate::session::{Session, SessionTransaction};
    pub use crate::storage::{Datastore, MemoryDatastore, Mutation};
}
