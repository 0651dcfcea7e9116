//! Testing utilities for the ConfShift workspace
//!
//! Shared fixtures: a throwaway on-disk workspace, a small unit registry
//! and ledger lines in the persisted format.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use confshift_core::{
    FileStore, MemorySecretProvider, MigrationContext, Orchestrator, RunContext, Unit,
    UnitCatalog, UnitError, UnitRegistry, UnitResult,
};
use confshift_ledger::{FileLedger, HistoryRecord, LedgerScope, LedgerStore};
use confshift_tree::Tree;
use tempfile::TempDir;

pub const CONFIG_ID: &str = "config";
pub const ENVIRONMENT: &str = "default";

pub const SET_FOO_BAR: &str = "2020_01_01_000001_set_foo_bar";
pub const SET_FOO_BAZ: &str = "2020_01_01_000002_set_foo_baz";
pub const ADD_SERVICES: &str = "2020_01_01_000003_add_services";
pub const BROKEN: &str = "2020_01_01_000004_broken";

/// Fixed run start, 2020-01-01T00:00:00Z
pub const STARTED_AT: i64 = 1_577_836_800;

pub fn scope() -> LedgerScope {
    LedgerScope::new(CONFIG_ID, ENVIRONMENT)
}

pub fn run_context() -> RunContext {
    RunContext::new(scope())
        .with_started_at(Utc.timestamp_opt(STARTED_AT, 0).single().unwrap_or_default())
        .with_secrets(Arc::new(MemorySecretProvider::new()))
}

pub fn yaml(text: &str) -> Tree {
    Tree::from_yaml_str(text).unwrap()
}

/// Apply: add `{key: value}` to the root. Revert: remove `key`.
pub fn add_root_key(key: &'static str, value: &'static str) -> Unit {
    Unit::new()
        .with_apply(move |ctx: &mut MigrationContext| -> UnitResult {
            ctx.get(".")?.add([(key, value)].into_iter().collect::<Tree>())?;
            Ok(())
        })
        .with_revert(move |ctx: &mut MigrationContext| -> UnitResult {
            ctx.get(".")?.remove(key)?;
            Ok(())
        })
}

/// Apply: set `selector` to `to`. Revert: set it back to `from`.
pub fn replace_value(selector: &'static str, from: &'static str, to: &'static str) -> Unit {
    Unit::new()
        .with_apply(move |ctx: &mut MigrationContext| -> UnitResult {
            ctx.get(selector)?.set(to);
            Ok(())
        })
        .with_revert(move |ctx: &mut MigrationContext| -> UnitResult {
            ctx.get(selector)?.set(from);
            Ok(())
        })
}

/// Unit whose every entry point fails
pub fn failing_unit(message: &'static str) -> Unit {
    Unit::new()
        .with_apply(move |_: &mut MigrationContext| -> UnitResult { Err(UnitError::msg(message)) })
        .with_revert(move |_: &mut MigrationContext| -> UnitResult { Err(UnitError::msg(message)) })
}

/// `SET_FOO_BAR` then `SET_FOO_BAZ`
pub fn foo_registry() -> UnitRegistry {
    UnitRegistry::new()
        .with(SET_FOO_BAR, add_root_key("foo", "bar"))
        .with(SET_FOO_BAZ, replace_value(".foo", "bar", "baz"))
}

/// History record as an earlier apply run would have written it
pub fn record(migration: &str, batch: u64, iteration: u64, ts: i64) -> HistoryRecord {
    HistoryRecord::new(
        &scope(),
        migration,
        confshift_ledger::BatchId::new(batch, iteration),
        ts,
    )
}

/// Temporary directory with a unit directory, a document and a ledger
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("migrations")).unwrap();
        fs::write(dir.path().join("config.yaml"), "").unwrap();
        Self { dir }
    }

    /// Workspace with a unit file for each identifier
    pub fn with_units(ids: &[&str]) -> Self {
        let ws = Self::new();
        for id in ids {
            ws.add_unit(id);
        }
        ws
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.root().join("migrations")
    }

    pub fn document_path(&self) -> PathBuf {
        self.root().join("config.yaml")
    }

    pub fn history_path(&self) -> PathBuf {
        self.root().join("history.log")
    }

    pub fn add_unit(&self, id: &str) {
        fs::write(self.migrations_dir().join(format!("{id}.rs")), "").unwrap();
    }

    pub fn write_document(&self, text: &str) {
        fs::write(self.document_path(), text).unwrap();
    }

    pub fn document_text(&self) -> String {
        fs::read_to_string(self.document_path()).unwrap()
    }

    pub fn document(&self) -> Tree {
        yaml(&self.document_text())
    }

    pub fn ledger(&self) -> FileLedger {
        FileLedger::new(self.history_path())
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.ledger().read().unwrap()
    }

    pub fn seed_history(&self, records: &[HistoryRecord]) {
        self.ledger().rewrite(records).unwrap();
    }

    /// Orchestrator over this workspace's files
    pub fn orchestrator<'r>(&self, registry: &'r UnitRegistry, ctx: RunContext) -> Orchestrator<'r> {
        Orchestrator::new(
            ctx,
            registry,
            UnitCatalog::new(self.migrations_dir()),
            Box::new(self.ledger()),
            Box::new(FileStore::new(self.document_path())),
        )
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
