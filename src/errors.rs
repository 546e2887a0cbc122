use std::fmt;

use crate::entity::{EntityKey, TransactionId};
use crate::wal::{LogEntry, LogState};

#[derive(thiserror::Error, Debug)]
pub enum AcidError {
    #[error("Entity [{key}] is locked by transaction [{holder}]")]
    ConcurrentModification { key: EntityKey, holder: TransactionId },

    #[error("Entity corresponding to the key [{key}] has already existed")]
    EntityExists { key: EntityKey },

    #[error("Entity corresponding to the key [{key}] does not exist")]
    EntityNotFound { key: EntityKey },

    #[error("Prepare failed for entity [{key}]: {reason}")]
    PrepareFailure { key: EntityKey, reason: String },

    /// Some participants committed and others did not. Never retried.
    #[error("{report}")]
    Indoubt {
        report: IndoubtReport,
        #[source]
        cause: Box<AcidError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No metamodel registered for entity kind [{kind}]")]
    UnknownEntity { kind: String },

    #[error("Entity of kind [{kind}] has no usable identity at [{path}]")]
    MissingIdentity { kind: String, path: String },

    #[error("Operation requires an open transaction")]
    NotInTransaction,

    #[error("Transaction [{id}] is still open")]
    TransactionActive { id: TransactionId },

    #[error("Transaction [{id}] has already finished")]
    TransactionClosed { id: TransactionId },

    #[error("Illegal log state transition [{from}] -> [{to}]")]
    IllegalTransition { from: LogState, to: LogState },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl AcidError {
    /// Whether the caller may retry the whole transaction after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AcidError::ConcurrentModification { .. } | AcidError::PrepareFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AcidError>;

/// The write-ahead log of a transaction that went in-doubt.
///
/// Rendering is the operator's recovery aid and tooling parses it, so the
/// layout is fixed:
///
/// ```text
/// Transaction [<id>] is in-doubt; Dump:
/// 	Operation 1 [PUT] -> [COMMITTED]: Entity [K1]
/// 	Operation 2 [PUT] -> [PREPARED]: Entity [K2]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndoubtReport {
    id: TransactionId,
    logs: Vec<LogEntry>,
}

impl IndoubtReport {
    pub fn new(id: TransactionId, mut logs: Vec<LogEntry>) -> Self {
        logs.sort_by_key(|log| log.sequence());
        Self { id, logs }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }
}

impl fmt::Display for IndoubtReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transaction [{}] is in-doubt; Dump: ", self.id)?;
        for (i, log) in self.logs.iter().enumerate() {
            writeln!(
                f,
                "\tOperation {} [{}] -> [{}]: Entity [{}]",
                i + 1,
                log.operation(),
                log.state(),
                log.entity().id()
            )?;
        }
        Ok(())
    }
}
