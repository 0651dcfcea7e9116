//! Apply and rollback runs
//!
//! The orchestrator ties the catalog, the ledger, document storage and the
//! unit registry together. A run walks the [`RunState`] machine:
//!
//! ```text
//! Idle -> Discover -> ExecuteUnit(0) -> ... -> Commit -> Done
//!                  \-------------------------> Abort  -> Done
//! ```
//!
//! Apply runs are all-or-nothing: the document is saved and the ledger
//! appended only after every unit succeeded. Rollback runs persist after
//! each reverted unit and rewrite the ledger at the end, even when a unit
//! failed part way through.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use confshift_ledger::{HistoryLedger, HistoryRecord, LedgerScope, LedgerStore};
use confshift_tree::{Tree, TreeDigest};

use crate::catalog::{MigrationUnit, UnitCatalog};
use crate::config::{RollbackConfig, RollbackFailurePolicy, SaveConfig};
use crate::context::MigrationContext;
use crate::diff::{LineDiff, DEFAULT_CONTEXT};
use crate::error::{MigrationError, UnitError};
use crate::secrets::{EnvSecretProvider, SecretProvider};
use crate::state::{RunState, StateTracker};
use crate::storage::TreeStore;
use crate::unit::{Direction, Entry, UnitRegistry};

/// Which applied units a rollback reverts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The most recent batch
    LastBatch,
    /// The newest `n` units
    Steps(usize),
    /// Everything applied after and including this unit
    To(String),
}

/// Progress callbacks
///
/// All methods default to doing nothing.
pub trait RunObserver {
    /// Units selected for the run, in execution order
    fn on_discovered(&mut self, _direction: Direction, _units: &[MigrationUnit]) {}

    /// A unit is about to run
    fn on_unit_started(&mut self, _direction: Direction, _unit: &MigrationUnit) {}

    /// A unit completed successfully
    fn on_unit_finished(&mut self, _direction: Direction, _unit: &MigrationUnit, _elapsed: Duration) {}

    /// Dry-run rendering change caused by `unit`
    fn on_diff(&mut self, _unit: &MigrationUnit, _diff: &LineDiff) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Settings fixed for one invocation
#[derive(Clone)]
pub struct RunContext {
    /// Ledger scope of the run
    pub scope: LedgerScope,
    /// Timestamp recorded for applied units
    pub started_at: DateTime<Utc>,
    /// Never persist anything
    pub dry_run: bool,
    /// Post-processing on save
    pub save: SaveConfig,
    /// Rollback behaviour
    pub rollback: RollbackConfig,
    /// Secret source handed to units
    pub secrets: Arc<dyn SecretProvider>,
}

impl RunContext {
    /// Context for `scope` starting now
    #[must_use]
    pub fn new(scope: LedgerScope) -> Self {
        Self {
            scope,
            started_at: Utc::now(),
            dry_run: false,
            save: SaveConfig::default(),
            rollback: RollbackConfig::default(),
            secrets: Arc::new(EnvSecretProvider),
        }
    }

    /// With start time
    #[inline]
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// With dry-run flag
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// With save settings
    #[inline]
    #[must_use]
    pub fn with_save(mut self, save: SaveConfig) -> Self {
        self.save = save;
        self
    }

    /// With rollback settings
    #[inline]
    #[must_use]
    pub fn with_rollback(mut self, rollback: RollbackConfig) -> Self {
        self.rollback = rollback;
        self
    }

    /// With secret provider
    #[inline]
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretProvider>) -> Self {
        self.secrets = secrets;
        self
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("scope", &self.scope)
            .field("started_at", &self.started_at)
            .field("dry_run", &self.dry_run)
            .field("save", &self.save)
            .field("rollback", &self.rollback)
            .field("secrets", &self.secrets.name())
            .finish()
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run direction
    pub direction: Direction,
    /// Batch number assigned to applied units
    pub batch: Option<u64>,
    /// Processed unit identifiers in execution order
    pub processed: Vec<String>,
    /// Where the document was saved, if it was
    pub saved_to: Option<String>,
    /// Document digest before the run
    pub digest_before: TreeDigest,
    /// Document digest after the run
    pub digest_after: TreeDigest,
    /// Visited states
    pub trail: Vec<RunState>,
    /// Dry run
    pub dry_run: bool,
    /// Wall time
    pub elapsed: Duration,
}

impl RunReport {
    /// Final state
    #[must_use]
    pub fn state(&self) -> RunState {
        self.trail.last().copied().unwrap_or(RunState::Idle)
    }

    /// Check whether no unit ran
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.processed.is_empty()
    }

    /// Check whether the document changed
    #[must_use]
    pub fn changed(&self) -> bool {
        self.digest_before != self.digest_after
    }
}

/// Runs units against one document and one ledger
pub struct Orchestrator<'r> {
    ctx: RunContext,
    registry: &'r UnitRegistry,
    catalog: UnitCatalog,
    ledger_store: Box<dyn LedgerStore>,
    tree_store: Box<dyn TreeStore>,
    observer: Box<dyn RunObserver>,
}

impl<'r> Orchestrator<'r> {
    /// Orchestrator with a no-op observer
    pub fn new(
        ctx: RunContext,
        registry: &'r UnitRegistry,
        catalog: UnitCatalog,
        ledger_store: Box<dyn LedgerStore>,
        tree_store: Box<dyn TreeStore>,
    ) -> Self {
        Self {
            ctx,
            registry,
            catalog,
            ledger_store,
            tree_store,
            observer: Box::new(NoopObserver),
        }
    }

    /// With progress observer
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run settings
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Load the full ledger; queries still only see this run's scope
    ///
    /// # Errors
    /// Returns ledger read errors
    pub fn load_ledger(&self) -> Result<HistoryLedger, MigrationError> {
        let mut ledger = HistoryLedger::new(self.ctx.scope.clone());
        ledger.load(self.ledger_store.read()?, false);
        Ok(ledger)
    }

    /// Applied records of this scope, oldest first
    ///
    /// # Errors
    /// Returns ledger read errors
    pub fn history(&self) -> Result<Vec<HistoryRecord>, MigrationError> {
        Ok(self.load_ledger()?.scoped().cloned().collect())
    }

    /// Units not applied yet, in execution order
    ///
    /// # Errors
    /// Returns ledger or catalog errors
    pub fn pending(&self) -> Result<Vec<MigrationUnit>, MigrationError> {
        Ok(self.catalog.pending(&self.load_ledger()?)?)
    }

    /// Apply every pending unit as one batch
    ///
    /// # Errors
    /// Returns the first discovery, unit or persistence error; nothing is
    /// persisted in that case
    pub fn migrate(&mut self) -> Result<RunReport, MigrationError> {
        let started = Instant::now();
        let mut state = StateTracker::new();
        state.advance(RunState::Discover)?;

        let result = self.apply_pending(&mut state);
        Self::finish(state, result, started)
    }

    fn apply_pending(&mut self, state: &mut StateTracker) -> Result<Partial, MigrationError> {
        let mut ledger = self.load_ledger()?;
        let units = self.catalog.pending(&ledger)?;
        let entries = self.entries(&units, Direction::Apply)?;
        self.observer.on_discovered(Direction::Apply, &units);

        let batch = ledger.last_batch_number() + 1;
        if units.is_empty() {
            tracing::info!(scope = %self.ctx.scope, "nothing to migrate");
            state.advance(RunState::Commit)?;
            return Ok(Partial::empty(Direction::Apply, self.ctx.dry_run));
        }

        let mut tree = self.tree_store.load()?;
        let before = TreeDigest::of(&tree);
        let mut rendered = self.initial_rendering(&tree)?;
        let ts = self.ctx.started_at.timestamp();

        for (i, (unit, entry)) in units.iter().zip(entries).enumerate() {
            state.advance(RunState::ExecuteUnit(i))?;
            tree = self
                .run_unit(unit, Direction::Apply, entry, tree)
                .map_err(|source| MigrationError::unit_failed(unit.id(), source))?;
            ledger.record_apply(unit.id(), batch, i as u64 + 1, ts);
            self.emit_diff(unit, &tree, rendered.as_mut())?;
        }

        state.advance(RunState::Commit)?;
        let saved_to = if self.ctx.dry_run {
            None
        } else {
            let location = self.tree_store.save(&tree)?;
            self.tree_store.flush()?;
            self.ledger_store.append(&ledger.take_pending())?;
            Some(location)
        };

        tracing::info!(
            scope = %self.ctx.scope,
            batch,
            count = units.len(),
            dry_run = self.ctx.dry_run,
            "migration batch complete"
        );
        Ok(Partial {
            direction: Direction::Apply,
            batch: Some(batch),
            processed: units.iter().map(|u| u.id().to_string()).collect(),
            saved_to,
            digest_before: before,
            digest_after: TreeDigest::of(&tree),
            dry_run: self.ctx.dry_run,
        })
    }

    /// Revert the units selected by `target`, newest first
    ///
    /// # Errors
    /// Returns selection or entry-point errors before anything runs, or
    /// the unit failure after the retained records were rewritten
    pub fn rollback(&mut self, target: &RollbackTarget) -> Result<RunReport, MigrationError> {
        let started = Instant::now();
        let mut state = StateTracker::new();
        state.advance(RunState::Discover)?;

        let result = self.revert_selected(&mut state, target);
        Self::finish(state, result, started)
    }

    fn revert_selected(
        &mut self,
        state: &mut StateTracker,
        target: &RollbackTarget,
    ) -> Result<Partial, MigrationError> {
        let mut ledger = self.load_ledger()?;
        let records = match target {
            RollbackTarget::LastBatch => ledger.last_batch(self.ctx.rollback.last_batch),
            RollbackTarget::Steps(steps) => ledger.steps_back(*steps)?,
            RollbackTarget::To(id) => ledger.to_target(id)?,
        };
        let units = records
            .iter()
            .map(|record| MigrationUnit::parse(&record.migration))
            .collect::<Result<Vec<_>, _>>()?;
        let entries = self.entries(&units, Direction::Revert)?;
        if self.ctx.rollback.on_failure == RollbackFailurePolicy::Compensate {
            self.entries(&units, Direction::Apply)?;
        }
        self.observer.on_discovered(Direction::Revert, &units);

        if units.is_empty() {
            tracing::info!(scope = %self.ctx.scope, "nothing to roll back");
            state.advance(RunState::Commit)?;
            return Ok(Partial::empty(Direction::Revert, self.ctx.dry_run));
        }

        let mut tree = self.tree_store.load()?;
        let before = TreeDigest::of(&tree);
        let mut rendered = self.initial_rendering(&tree)?;
        let mut reverted: Vec<(&MigrationUnit, HistoryRecord)> = Vec::new();
        let mut saved_to = None;
        let mut failure = None;

        for (i, (unit, entry)) in units.iter().zip(entries).enumerate() {
            state.advance(RunState::ExecuteUnit(i))?;
            let next = match self.run_unit(unit, Direction::Revert, entry, tree.clone()) {
                Ok(next) => next,
                Err(source) => {
                    failure = Some(MigrationError::unit_failed(unit.id(), source));
                    break;
                }
            };
            // A unit only counts as reverted once its document is persisted
            match self.persist_reverted(unit, &next, rendered.as_mut()) {
                Ok(location) => {
                    tree = next;
                    saved_to = location.or(saved_to);
                    if let Some(record) = ledger.record_revert(unit.id()) {
                        reverted.push((unit, record));
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let outcome = match failure {
            None => {
                state.advance(RunState::Commit)?;
                Ok(())
            }
            Some(err) => {
                state.advance(RunState::Abort)?;
                Err(match self.ctx.rollback.on_failure {
                    RollbackFailurePolicy::KeepReverted => err,
                    RollbackFailurePolicy::Compensate => {
                        self.compensate(&mut ledger, tree.clone(), &reverted, err)
                    }
                })
            }
        };

        if !self.ctx.dry_run {
            // A failed flush leaves the ledger as it was
            self.tree_store.flush()?;
            let retained: Vec<HistoryRecord> = ledger.records().cloned().collect();
            self.ledger_store.rewrite(&retained)?;
        }
        outcome?;

        tracing::info!(
            scope = %self.ctx.scope,
            count = units.len(),
            dry_run = self.ctx.dry_run,
            "rollback complete"
        );
        Ok(Partial {
            direction: Direction::Revert,
            batch: None,
            processed: units.iter().map(|u| u.id().to_string()).collect(),
            saved_to,
            digest_before: before,
            digest_after: TreeDigest::of(&tree),
            dry_run: self.ctx.dry_run,
        })
    }

    /// Re-apply `reverted` oldest first; returns the error to report
    fn compensate(
        &mut self,
        ledger: &mut HistoryLedger,
        mut tree: Tree,
        reverted: &[(&MigrationUnit, HistoryRecord)],
        original: MigrationError,
    ) -> MigrationError {
        tracing::warn!(count = reverted.len(), error = %original, "rollback failed, re-applying reverted units");
        let registry = self.registry;

        for (unit, record) in reverted.iter().rev() {
            let applied = registry
                .entry(unit.id(), Direction::Apply)
                .map_err(|err| UnitError::msg(err.to_string()))
                .and_then(|entry| self.run_unit(unit, Direction::Apply, entry, tree.clone()));
            match applied {
                Ok(next) => {
                    tree = next;
                    ledger.restore(record.clone());
                }
                Err(source) => {
                    return MigrationError::Compensation {
                        unit: unit.id().to_string(),
                        original: Box::new(original),
                        source,
                    };
                }
            }
        }

        if !self.ctx.dry_run && !reverted.is_empty() {
            if let Err(err) = self.tree_store.save(&tree) {
                tracing::error!(error = %err, "failed to save compensated document");
            }
        }
        original
    }

    fn persist_reverted(
        &mut self,
        unit: &MigrationUnit,
        tree: &Tree,
        rendered: Option<&mut String>,
    ) -> Result<Option<String>, MigrationError> {
        self.emit_diff(unit, tree, rendered)?;
        if self.ctx.dry_run {
            return Ok(None);
        }
        Ok(Some(self.tree_store.save(tree)?))
    }

    fn entries(
        &self,
        units: &[MigrationUnit],
        direction: Direction,
    ) -> Result<Vec<&'r Entry>, MigrationError> {
        let registry = self.registry;
        units
            .iter()
            .map(|unit| registry.entry(unit.id(), direction))
            .collect()
    }

    fn run_unit(
        &mut self,
        unit: &MigrationUnit,
        direction: Direction,
        entry: &Entry,
        tree: Tree,
    ) -> Result<Tree, UnitError> {
        self.observer.on_unit_started(direction, unit);
        let timer = Instant::now();

        let mut ctx = MigrationContext::new(
            unit.clone(),
            self.ctx.scope.clone(),
            tree,
            self.ctx.save,
            Arc::clone(&self.ctx.secrets),
        );
        entry(&mut ctx)?;
        let tree = ctx.into_tree()?;

        let elapsed = timer.elapsed();
        tracing::info!(unit = %unit, %direction, elapsed_ms = elapsed.as_millis() as u64, "unit finished");
        self.observer.on_unit_finished(direction, unit, elapsed);
        Ok(tree)
    }

    fn initial_rendering(&self, tree: &Tree) -> Result<Option<String>, MigrationError> {
        if self.ctx.dry_run {
            Ok(Some(self.tree_store.render(tree)?))
        } else {
            Ok(None)
        }
    }

    fn emit_diff(
        &mut self,
        unit: &MigrationUnit,
        tree: &Tree,
        previous: Option<&mut String>,
    ) -> Result<(), MigrationError> {
        let Some(previous) = previous else {
            return Ok(());
        };
        let current = self.tree_store.render(tree)?;
        let diff = LineDiff::compute(previous, &current, DEFAULT_CONTEXT);
        self.observer.on_diff(unit, &diff);
        *previous = current;
        Ok(())
    }

    fn finish(
        mut state: StateTracker,
        result: Result<Partial, MigrationError>,
        started: Instant,
    ) -> Result<RunReport, MigrationError> {
        match result {
            Ok(partial) => {
                state.advance(RunState::Done)?;
                Ok(partial.into_report(state.into_trail(), started.elapsed()))
            }
            Err(err) => {
                if state.current() != RunState::Abort {
                    state.advance(RunState::Abort)?;
                }
                state.advance(RunState::Done)?;
                tracing::error!(error = %err, elapsed_ms = started.elapsed().as_millis() as u64, "run failed");
                Err(err)
            }
        }
    }
}

/// Report fields known before the run is finished
struct Partial {
    direction: Direction,
    batch: Option<u64>,
    processed: Vec<String>,
    saved_to: Option<String>,
    digest_before: TreeDigest,
    digest_after: TreeDigest,
    dry_run: bool,
}

impl Partial {
    fn empty(direction: Direction, dry_run: bool) -> Self {
        let digest = TreeDigest::of(&Tree::Null);
        Self {
            direction,
            batch: None,
            processed: Vec::new(),
            saved_to: None,
            digest_before: digest,
            digest_after: digest,
            dry_run,
        }
    }

    fn into_report(self, trail: Vec<RunState>, elapsed: Duration) -> RunReport {
        RunReport {
            direction: self.direction,
            batch: self.batch,
            processed: self.processed,
            saved_to: self.saved_to,
            digest_before: self.digest_before,
            digest_after: self.digest_after,
            trail,
            dry_run: self.dry_run,
            elapsed,
        }
    }
}
