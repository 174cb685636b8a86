//! Per-execution query options consulted during lowering.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    #[default]
    None,
    Read,
    Optimistic,
    PessimisticRead,
    PessimisticWrite,
    UpgradeNowait,
    UpgradeSkipLocked,
}

impl LockMode {
    pub fn is_none(&self) -> bool {
        matches!(self, LockMode::None)
    }

    /// Whether the mode needs a row lock in the generated SQL
    pub fn is_pessimistic(&self) -> bool {
        matches!(
            self,
            LockMode::PessimisticRead
                | LockMode::PessimisticWrite
                | LockMode::UpgradeNowait
                | LockMode::UpgradeSkipLocked
        )
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockMode::None => "NONE",
            LockMode::Read => "READ",
            LockMode::Optimistic => "OPTIMISTIC",
            LockMode::PessimisticRead => "PESSIMISTIC_READ",
            LockMode::PessimisticWrite => "PESSIMISTIC_WRITE",
            LockMode::UpgradeNowait => "UPGRADE_NOWAIT",
            LockMode::UpgradeSkipLocked => "UPGRADE_SKIPLOCKED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOptions {
    /// Applied to every root without an alias-specific mode
    pub lock_mode: LockMode,
    /// Explicit alias → lock mode
    pub alias_specific: HashMap<String, LockMode>,
    pub timeout_ms: Option<u32>,
}

impl LockOptions {
    pub fn is_empty(&self) -> bool {
        self.lock_mode.is_none() && self.alias_specific.is_empty()
    }

    pub fn with_alias_lock_mode(mut self, alias: impl Into<String>, mode: LockMode) -> Self {
        self.alias_specific.insert(alias.into(), mode);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub lock_options: LockOptions,
    /// Result de-duplication; `Some(false)` turns off top-level selection
    /// de-duplication regardless of configuration
    pub deduplicate_results: Option<bool>,
}
