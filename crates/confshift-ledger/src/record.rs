//! History records and their JSON-lines encoding

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LedgerError, Result};

/// Configuration and environment a ledger instance answers for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerScope {
    /// Configuration identifier
    pub config_id: String,
    /// Environment name
    pub environment: String,
}

impl LedgerScope {
    /// Create a scope
    pub fn new(config_id: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            environment: environment.into(),
        }
    }

    /// Composite key of `migration` within this scope
    #[must_use]
    pub fn key(&self, migration: &str) -> RecordKey {
        RecordKey {
            config_id: self.config_id.clone(),
            environment: self.environment.clone(),
            migration: migration.to_string(),
        }
    }
}

/// Identity of a record: one migration in one configuration and environment
///
/// Compared field by field, so names containing `_` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Configuration identifier
    pub config_id: String,
    /// Environment name
    pub environment: String,
    /// Migration identifier
    pub migration: String,
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.config_id, self.environment, self.migration)
    }
}

impl Display for LedgerScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.config_id, self.environment)
    }
}

/// `<batch>.<iteration>` position of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId {
    /// Apply run number, increasing per successful run
    pub batch: u64,
    /// 1-based position within the run
    pub iteration: u64,
}

impl BatchId {
    /// Create a batch id
    #[inline]
    #[must_use]
    pub const fn new(batch: u64, iteration: u64) -> Self {
        Self { batch, iteration }
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.batch, self.iteration)
    }
}

impl FromStr for BatchId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LedgerError::InvalidBatchId(s.to_string());
        let (batch, iteration) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            batch: batch.parse().map_err(|_| invalid())?,
            iteration: iteration.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for BatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// One applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Configuration identifier
    pub config_id: String,
    /// Environment name
    pub environment_name: String,
    /// Migration identifier
    pub migration: String,
    /// Unix seconds when the run started
    #[serde(with = "unix_text")]
    pub ts: i64,
    /// Batch position
    pub batch_id: BatchId,
}

impl HistoryRecord {
    /// Create a record for `migration` in `scope`
    pub fn new(scope: &LedgerScope, migration: impl Into<String>, batch_id: BatchId, ts: i64) -> Self {
        Self {
            config_id: scope.config_id.clone(),
            environment_name: scope.environment.clone(),
            migration: migration.into(),
            ts,
            batch_id,
        }
    }

    /// Key rendered as `configId_environmentName_migration`
    #[must_use]
    pub fn composite_key(&self) -> RecordKey {
        RecordKey {
            config_id: self.config_id.clone(),
            environment: self.environment_name.clone(),
            migration: self.migration.clone(),
        }
    }

    /// Check whether this record belongs to `scope`
    #[must_use]
    pub fn in_scope(&self, scope: &LedgerScope) -> bool {
        self.config_id == scope.config_id && self.environment_name == scope.environment
    }

    /// Encode as one JSON line (no trailing newline)
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one JSON line
    ///
    /// # Errors
    /// Returns `InvalidRecord` with the given line number
    pub fn from_json_line(line: &str, line_no: usize) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| LedgerError::InvalidRecord {
            line: line_no,
            reason: e.to_string(),
        })
    }
}

/// Timestamps are written as decimal strings; numbers are accepted on read
mod unix_text {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    pub(super) fn serialize<S: Serializer>(ts: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(ts)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| de::Error::custom(format!("invalid timestamp `{text}`"))),
            Repr::Number(n) => Ok(n),
        }
    }
}
