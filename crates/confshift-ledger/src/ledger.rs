//! In-memory history with rollback selection queries
//!
//! Records are kept in load/append order, which is also their
//! chronological order; "newest" always means last inserted. Queries only
//! look at records of the ledger's own [`LedgerScope`], while the full
//! loaded set is kept so a rewrite does not drop other scopes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::record::{BatchId, HistoryRecord, LedgerScope, RecordKey};

/// Which records make up "the last batch"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchGrouping {
    /// Records sharing the newest record's batch number
    #[default]
    BatchNumber,
    /// Records sharing the newest record's timestamp
    Timestamp,
}

/// History of applied migrations for one scope
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    scope: LedgerScope,
    records: IndexMap<RecordKey, HistoryRecord>,
    last_batch: u64,
    pending: Vec<HistoryRecord>,
}

impl HistoryLedger {
    /// Empty ledger for `scope`
    #[must_use]
    pub fn new(scope: LedgerScope) -> Self {
        Self {
            scope,
            records: IndexMap::new(),
            last_batch: 0,
            pending: Vec::new(),
        }
    }

    /// Scope this ledger answers for
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &LedgerScope {
        &self.scope
    }

    /// Replace memory with `records`
    ///
    /// With `filtered`, out-of-scope records are dropped. The last batch
    /// number is computed over in-scope records either way.
    pub fn load(&mut self, records: impl IntoIterator<Item = HistoryRecord>, filtered: bool) {
        self.records.clear();
        self.pending.clear();
        self.last_batch = 0;

        for record in records {
            let in_scope = record.in_scope(&self.scope);
            if in_scope {
                self.last_batch = self.last_batch.max(record.batch_id.batch);
            }
            if in_scope || !filtered {
                self.records.insert(record.composite_key(), record);
            }
        }

        tracing::debug!(
            scope = %self.scope,
            loaded = self.records.len(),
            last_batch = self.last_batch,
            filtered,
            "loaded history"
        );
    }

    /// Record a successful apply and buffer it for [`take_pending`](Self::take_pending)
    pub fn record_apply(&mut self, migration: &str, batch: u64, iteration: u64, ts: i64) -> &HistoryRecord {
        let record = HistoryRecord::new(&self.scope, migration, BatchId::new(batch, iteration), ts);
        let key = record.composite_key();
        self.last_batch = self.last_batch.max(batch);
        self.pending.push(record.clone());
        self.records.shift_remove(&key);
        self.records.entry(key).or_insert(record)
    }

    /// Buffered apply records not yet persisted
    #[must_use]
    pub fn pending(&self) -> &[HistoryRecord] {
        &self.pending
    }

    /// Drain buffered apply records
    pub fn take_pending(&mut self) -> Vec<HistoryRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Forget `migration`, returning its record if it was applied
    pub fn record_revert(&mut self, migration: &str) -> Option<HistoryRecord> {
        let removed = self.records.shift_remove(&self.scope.key(migration));
        if removed.is_none() {
            tracing::warn!(migration, scope = %self.scope, "revert of migration without history");
        }
        removed
    }

    /// Put a previously reverted record back as the newest entry
    pub fn restore(&mut self, record: HistoryRecord) {
        self.last_batch = self.last_batch.max(record.batch_id.batch);
        self.records.insert(record.composite_key(), record);
    }

    /// Check whether `migration` is applied in this scope
    #[must_use]
    pub fn is_applied(&self, migration: &str) -> bool {
        self.records.contains_key(&self.scope.key(migration))
    }

    /// Highest in-scope batch number seen, 0 when none
    #[inline]
    #[must_use]
    pub fn last_batch_number(&self) -> u64 {
        self.last_batch
    }

    /// Every loaded record in chronological order
    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.values()
    }

    /// In-scope records in chronological order
    pub fn scoped(&self) -> impl DoubleEndedIterator<Item = &HistoryRecord> {
        self.records
            .values()
            .filter(move |record| record.in_scope(&self.scope))
    }

    /// Number of in-scope records
    #[must_use]
    pub fn scoped_len(&self) -> usize {
        self.scoped().count()
    }

    /// Records of the newest batch, newest first
    #[must_use]
    pub fn last_batch(&self, grouping: BatchGrouping) -> Vec<HistoryRecord> {
        let Some(newest) = self.scoped().next_back() else {
            return Vec::new();
        };

        self.scoped()
            .rev()
            .filter(|record| match grouping {
                BatchGrouping::BatchNumber => record.batch_id.batch == newest.batch_id.batch,
                BatchGrouping::Timestamp => record.ts == newest.ts,
            })
            .cloned()
            .collect()
    }

    /// Newest `steps` records, newest first
    ///
    /// # Errors
    /// Returns `InsufficientHistory` if fewer records are in scope
    pub fn steps_back(&self, steps: usize) -> Result<Vec<HistoryRecord>> {
        let available = self.scoped_len();
        if steps > available {
            return Err(LedgerError::InsufficientHistory {
                requested: steps,
                available,
            });
        }
        Ok(self.scoped().rev().take(steps).cloned().collect())
    }

    /// Newest records back to and including `migration`, newest first
    ///
    /// # Errors
    /// Returns `TargetNotFound` if `migration` is not applied in scope
    pub fn to_target(&self, migration: &str) -> Result<Vec<HistoryRecord>> {
        if !self.is_applied(migration) {
            return Err(LedgerError::TargetNotFound(migration.to_string()));
        }

        let mut selected = Vec::new();
        for record in self.scoped().rev() {
            selected.push(record.clone());
            if record.migration == migration {
                break;
            }
        }
        Ok(selected)
    }
}
