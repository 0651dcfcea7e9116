//! Subcommand implementations

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Color;
use confshift_core::{
    ConfShiftConfig, FileStore, MigrationError, Orchestrator, RollbackTarget, RunContext,
    SelectedEnvironment, TreeStore, UnitCatalog, UnitRegistry,
};
use confshift_ledger::{FileLedger, LedgerScope};
use confshift_tree::mask_values;

use crate::cli::{Action, GlobalArgs};
use crate::output::{Output, Progress};

/// Executes one parsed action
pub struct Runner<'a> {
    globals: GlobalArgs,
    registry: &'a UnitRegistry,
    out: Output,
}

impl<'a> Runner<'a> {
    /// Runner writing to `out`
    pub fn new(globals: GlobalArgs, registry: &'a UnitRegistry, out: Output) -> Self {
        Self {
            globals,
            registry,
            out,
        }
    }

    /// Run `action`, printing any error; migrate and rollback also print
    /// the elapsed time
    ///
    /// # Errors
    /// Returns any configuration, discovery, unit or I/O error
    pub fn execute(&mut self, action: &Action) -> Result<()> {
        let started = Instant::now();
        let result = match action {
            Action::Init { path } => self.init(path.as_deref()),
            Action::Create { name } => self.create(name),
            Action::Migrate { dry_run } => self.migrate(*dry_run),
            Action::Rollback { target, dry_run } => self.rollback(target, *dry_run),
            Action::History => self.history(),
            Action::Mask { dry_run } => self.mask(*dry_run),
        };
        if let Err(err) = &result {
            let mut message = describe(err);
            if self.registry.is_empty() && is_unregistered(err) {
                message.push_str(NO_UNITS_HINT);
            }
            self.out.error(&message);
        }
        if matches!(action, Action::Migrate { .. } | Action::Rollback { .. }) {
            self.out.elapsed(started.elapsed());
        }
        result
    }

    fn load_config(&self) -> Result<ConfShiftConfig> {
        ConfShiftConfig::load(&self.globals.config)
            .with_context(|| format!("loading {}", self.globals.config.display()))
    }

    /// Select the environment; a stream document takes over standard output
    fn select<'c>(&mut self, config: &'c ConfShiftConfig) -> Result<SelectedEnvironment<'c>> {
        let env = config.environment(self.globals.env.as_deref())?;
        if env.document_path().is_none() {
            self.out = self.out.clone().off_stdout();
        }
        self.out
            .field("Using configuration", &self.globals.config.display().to_string());
        if env.defaulted {
            self.out.paint(
                &format!("Warning, no environment specified; defaulting to '{}'\n", env.name),
                Color::BrightRed,
            );
        } else {
            self.out.field("Using environment", env.name);
        }
        Ok(env)
    }

    fn orchestrator(
        &self,
        config: &ConfShiftConfig,
        env: &SelectedEnvironment<'_>,
        dry_run: bool,
    ) -> Orchestrator<'a> {
        let ctx = RunContext::new(LedgerScope::new(config.config_id(), env.name))
            .with_dry_run(dry_run)
            .with_save(config.save)
            .with_rollback(config.rollback)
            .with_secrets(env.secrets());
        Orchestrator::new(
            ctx,
            self.registry,
            UnitCatalog::new(env.migrations_dir()),
            Box::new(FileLedger::new(config.history_path())),
            env.open_store(),
        )
        .with_observer(Box::new(Progress::new(self.out.clone())))
    }

    fn run_header(&self, config: &ConfShiftConfig, env: &SelectedEnvironment<'_>, dry_run: bool) {
        self.out
            .field("Using history", &config.history_path().display().to_string());
        self.out
            .field("Migrations file path", &env.migrations_dir().display().to_string());
        self.out.field("Using secrets manager", env.secrets().name());
        if dry_run {
            self.out.paint("Dry run: nothing will be written\n", Color::Yellow);
        }
    }

    fn init(&self, dir: Option<&Path>) -> Result<()> {
        let target = match dir {
            Some(dir) => dir.join(&self.globals.config),
            None => self.globals.config.clone(),
        };
        ConfShiftConfig::write_template(&target)?;
        self.out
            .paint(&format!("Created config file {}.\n\n", target.display()), Color::White);
        Ok(())
    }

    fn create(&mut self, name: &str) -> Result<()> {
        let config = self.load_config()?;
        let env = self.select(&config)?;
        let catalog = UnitCatalog::new(env.migrations_dir());
        let path = catalog.scaffold(name, Utc::now())?;
        self.out
            .paint(&format!("Created {}\n\n", path.display()), Color::White);
        Ok(())
    }

    fn migrate(&mut self, dry_run: bool) -> Result<()> {
        let config = self.load_config()?;
        let env = self.select(&config)?;
        self.run_header(&config, &env, dry_run);

        let mut orchestrator = self.orchestrator(&config, &env, dry_run);
        let next_batch = orchestrator.load_ledger()?.last_batch_number() + 1;
        self.out.field("Batch id", &next_batch.to_string());

        let report = orchestrator.migrate()?;
        if let Some(location) = &report.saved_to {
            self.out
                .paint(&format!("\nSaved {location}\n"), Color::BrightBlack);
        }
        Ok(())
    }

    fn rollback(&mut self, target: &RollbackTarget, dry_run: bool) -> Result<()> {
        let config = self.load_config()?;
        let env = self.select(&config)?;
        self.run_header(&config, &env, dry_run);

        let mut orchestrator = self.orchestrator(&config, &env, dry_run);
        match target {
            RollbackTarget::LastBatch => {
                let batch = orchestrator.load_ledger()?.last_batch_number();
                self.out.field("Rolling back to batch", &batch.to_string());
            }
            RollbackTarget::Steps(steps) => {
                self.out.field("Rolling back steps", &steps.to_string());
            }
            RollbackTarget::To(id) => self.out.field("Rolling back to target", id),
        }

        let report = orchestrator.rollback(target)?;
        if let Some(location) = &report.saved_to {
            self.out
                .paint(&format!("\nSaved {location}\n"), Color::BrightBlack);
        }
        Ok(())
    }

    fn history(&mut self) -> Result<()> {
        let config = self.load_config()?;
        let env = self.select(&config)?;
        let records = self.orchestrator(&config, &env, true).history()?;

        self.out.paint(
            "\nDate                | Batch ID | Migration\n\
             -----------------------------------------------------------------------------------\n",
            Color::White,
        );
        for record in records.iter().rev() {
            let date = DateTime::<Utc>::from_timestamp(record.ts, 0)
                .map_or_else(|| record.ts.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
            let migration: String = record.migration.chars().take(50).collect();
            self.out.paint(
                &format!("{date:<19} | {:<8} | {migration}\n", record.batch_id.to_string()),
                Color::White,
            );
        }
        if records.is_empty() {
            self.out.paint("No migrations found.\n", Color::White);
        }
        self.out.write("\n");
        Ok(())
    }

    fn mask(&mut self, dry_run: bool) -> Result<()> {
        let config = self.load_config()?;
        let env = self.select(&config)?;
        let mut store = env.open_store();
        let masked = mask_values(store.load()?);

        if dry_run {
            self.out.write(&format!("{}\n", store.render(&masked)?));
            return Ok(());
        }

        let Some(path) = env.document_path() else {
            store.save(&masked)?;
            store.flush()?;
            return Ok(());
        };
        let mut file = FileStore::new(&path);
        let backup = file
            .backup_now()?
            .with_context(|| format!("document {} does not exist", path.display()))?;
        file.save(&masked)?;
        self.out.paint(
            &format!(
                "Masked {}. The original has been backed up as {}.\n\n",
                path.display(),
                backup.display()
            ),
            Color::White,
        );
        Ok(())
    }
}

const NO_UNITS_HINT: &str = "\n   This binary has no migrations compiled in. Build your own binary \
     that calls confshift_cli::run with a UnitRegistry holding your migrations.";

fn is_unregistered(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<MigrationError>(),
        Some(MigrationError::UnitNotRegistered(_))
    )
}

/// Error chain on one line, skipping causes already in the message
fn describe(err: &anyhow::Error) -> String {
    let mut text = err.to_string();
    for cause in err.chain().skip(1) {
        let cause = cause.to_string();
        if !text.contains(&cause) {
            text.push_str(": ");
            text.push_str(&cause);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use confshift_core::UnitError;
    use pretty_assertions::assert_eq;

    #[test]
    fn describe_skips_repeated_causes() {
        let err = anyhow::Error::new(MigrationError::unit_failed("u1", UnitError::msg("boom")));
        assert_eq!(describe(&err), "migration u1 failed: boom");

        let err = anyhow::Error::new(std::io::Error::other("disk full")).context("saving");
        assert_eq!(describe(&err), "saving: disk full");
    }
}
