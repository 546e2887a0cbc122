use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How reads outside a transaction treat an entity another transaction has
/// locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPolicy {
    /// Fail with `ConcurrentModification`; the locked value may be about to change.
    #[default]
    FailOnLocked,
    /// Return the last committed value, ignoring Locks.
    LastCommitted,
}

/// Session configuration.
///
/// Loadable from JSON; missing fields take their defaults:
///
/// ```
/// use acidhouse::{ReadPolicy, SessionConfig};
///
/// let config: SessionConfig =
///     serde_json::from_str(r#"{"read_policy": "last_committed"}"#).unwrap();
/// assert_eq!(config.read_policy, ReadPolicy::LastCommitted);
/// assert!(!config.parallel_prepare);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub read_policy: ReadPolicy,
    /// Age after which a Lock held by another transaction is treated as
    /// abandoned by a crashed coordinator. Transactional reads of such an
    /// entity fail with `Indoubt` instead of `ConcurrentModification`.
    /// Locks are never broken automatically.
    pub stale_lock_after: Option<Duration>,
    /// Prepare participants concurrently.
    pub parallel_prepare: bool,
}

impl SessionConfig {
    pub fn with_read_policy(mut self, read_policy: ReadPolicy) -> Self {
        self.read_policy = read_policy;
        self
    }

    pub fn with_stale_lock_after(mut self, threshold: Duration) -> Self {
        self.stale_lock_after = Some(threshold);
        self
    }

    pub fn with_parallel_prepare(mut self, parallel_prepare: bool) -> Self {
        self.parallel_prepare = parallel_prepare;
        self
    }
}
