//! Ledger persistence
//!
//! Apply runs append; rollback runs rewrite the whole retained set.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LedgerError, Result};
use crate::record::HistoryRecord;

/// Durable storage behind a [`HistoryLedger`](crate::HistoryLedger)
pub trait LedgerStore {
    /// Read every stored record in order
    ///
    /// # Errors
    /// Returns error if the store cannot be read or a record is malformed
    fn read(&self) -> Result<Vec<HistoryRecord>>;

    /// Append records after the existing ones
    ///
    /// # Errors
    /// Returns error if the store cannot be written
    fn append(&self, records: &[HistoryRecord]) -> Result<()>;

    /// Replace the stored set with `records`
    ///
    /// # Errors
    /// Returns error if the store cannot be written
    fn rewrite(&self, records: &[HistoryRecord]) -> Result<()>;

    /// Human readable location, for reports
    fn describe(&self) -> String;
}

/// Newline-delimited JSON file
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    /// Ledger stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(records: &[HistoryRecord]) -> Result<String> {
        let mut out = String::new();
        for record in records {
            out.push_str(&record.to_json_line()?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl LedgerStore for FileLedger {
    fn read(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no ledger file yet");
            return Ok(Vec::new());
        }

        let text = fs::read_to_string(&self.path).map_err(|e| LedgerError::io(&self.path, e))?;
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| HistoryRecord::from_json_line(line.trim(), index + 1))
            .collect()
    }

    fn append(&self, records: &[HistoryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let payload = Self::encode(records)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.write_all(payload.as_bytes())
            .map_err(|e| LedgerError::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), count = records.len(), "appended ledger records");
        Ok(())
    }

    fn rewrite(&self, records: &[HistoryRecord]) -> Result<()> {
        let payload = Self::encode(records)?;
        fs::write(&self.path, payload).map_err(|e| LedgerError::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), count = records.len(), "rewrote ledger");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store; clones share the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Vec<HistoryRecord>>>,
}

impl MemoryLedger {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `records`
    #[must_use]
    pub fn with_records(records: Vec<HistoryRecord>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(records)),
        }
    }

    /// Snapshot of stored records
    #[must_use]
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.inner.lock().clone()
    }
}

impl LedgerStore for MemoryLedger {
    fn read(&self) -> Result<Vec<HistoryRecord>> {
        Ok(self.records())
    }

    fn append(&self, records: &[HistoryRecord]) -> Result<()> {
        self.inner.lock().extend_from_slice(records);
        Ok(())
    }

    fn rewrite(&self, records: &[HistoryRecord]) -> Result<()> {
        *self.inner.lock() = records.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BatchId, LedgerScope};
    use pretty_assertions::assert_eq;

    fn sample(migration: &str, batch: u64) -> HistoryRecord {
        HistoryRecord::new(
            &LedgerScope::new("config", "default"),
            migration,
            BatchId::new(batch, 1),
            1_586_008_228,
        )
    }

    #[test]
    fn file_missing_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("history.log"));
        assert!(ledger.read().unwrap().is_empty());
    }

    #[test]
    fn file_append_then_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("history.log"));

        ledger.append(&[sample("m1", 1)]).unwrap();
        ledger.append(&[sample("m2", 2)]).unwrap();
        assert_eq!(ledger.read().unwrap(), vec![sample("m1", 1), sample("m2", 2)]);

        ledger.rewrite(&[sample("m2", 2)]).unwrap();
        assert_eq!(ledger.read().unwrap(), vec![sample("m2", 2)]);

        ledger.rewrite(&[]).unwrap();
        assert!(ledger.read().unwrap().is_empty());
    }

    #[test]
    fn file_lines_are_json_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        let ledger = FileLedger::new(&path);
        ledger.append(&[sample("m1", 1)]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "{\"configId\":\"config\",\"environmentName\":\"default\",\"migration\":\"m1\",\"ts\":\"1586008228\",\"batchId\":\"1.1\"}\n"
        );
    }

    #[test]
    fn file_skips_blank_lines_and_reports_bad_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        let good = sample("m1", 1).to_json_line().unwrap();
        fs::write(&path, format!("{good}\n\n")).unwrap();
        assert_eq!(FileLedger::new(&path).read().unwrap().len(), 1);

        fs::write(&path, format!("{good}\nnot json\n")).unwrap();
        let err = FileLedger::new(&path).read().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn memory_clones_share_state() {
        let store = MemoryLedger::new();
        let handle = store.clone();
        store.append(&[sample("m1", 1)]).unwrap();
        assert_eq!(handle.records().len(), 1);
        handle.rewrite(&[]).unwrap();
        assert!(store.read().unwrap().is_empty());
    }
}
