//! Per-transaction write-ahead log.
//!
//! Every operation recorded against a coordinator gets a [`LogEntry`] before
//! any I/O happens. Entries only move forward through [`LogState`] and are the
//! sole payload of an in-doubt report.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityKey;
use crate::errors::{AcidError, Result};

/// Datastore operation recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Get,
    Put,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Get => "GET",
            Operation::Put => "PUT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        })
    }
}

/// Commit state of a logged operation. Ordered: a state may only be replaced
/// by itself or a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogState {
    None,
    Uncommitted,
    Prepared,
    Committed,
}

impl LogState {
    /// Guarded transition. Moving backward is rejected; re-applying the
    /// current state is a no-op.
    pub fn advance(self, next: LogState) -> Result<LogState> {
        if next < self {
            return Err(AcidError::IllegalTransition {
                from: self,
                to: next,
            });
        }
        Ok(next)
    }
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogState::None => "NONE",
            LogState::Uncommitted => "UNCOMMITTED",
            LogState::Prepared => "PREPARED",
            LogState::Committed => "COMMITTED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    sequence: u64,
    operation: Operation,
    entity: EntityKey,
    state: LogState,
}

impl LogEntry {
    /// A freshly recorded operation, in state `Uncommitted`.
    pub fn new(sequence: u64, operation: Operation, entity: EntityKey) -> Self {
        Self {
            sequence,
            operation,
            entity,
            state: LogState::Uncommitted,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    pub fn advance(&mut self, next: LogState) -> Result<()> {
        self.state = self.state.advance(next)?;
        Ok(())
    }
}
