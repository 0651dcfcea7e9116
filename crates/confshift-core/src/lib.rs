//! ConfShift Core - migration runs over YAML configuration documents
//!
//! Responsibilities:
//! - Discover migration units and scaffold new ones
//! - Run pending units as one batch, or revert applied ones
//! - Give unit code selector-based access to the document
//! - Resolve secrets and load/save documents through pluggable adapters
//!
//! # Example
//!
//! ```rust,no_run
//! use confshift_core::prelude::*;
//! use confshift_ledger::{FileLedger, LedgerScope};
//!
//! fn add_database(ctx: &mut MigrationContext) -> UnitResult {
//!     let database: Tree = [("host", "localhost")].into_iter().collect();
//!     ctx.get(".")?.add([("database", database)].into_iter().collect::<Tree>())?;
//!     Ok(())
//! }
//!
//! fn remove_database(ctx: &mut MigrationContext) -> UnitResult {
//!     ctx.get(".")?.remove("database")?;
//!     Ok(())
//! }
//!
//! # fn main() -> Result<(), MigrationError> {
//! let registry = UnitRegistry::new().with(
//!     "2020_03_31_225419_add_database",
//!     Unit::new().with_apply(add_database).with_revert(remove_database),
//! );
//!
//! let mut orchestrator = Orchestrator::new(
//!     RunContext::new(LedgerScope::new("billing", "production")),
//!     &registry,
//!     UnitCatalog::new("./migrations"),
//!     Box::new(FileLedger::new("./history.log")),
//!     Box::new(FileStore::new("./config.yaml")),
//! );
//! let report = orchestrator.migrate()?;
//! println!("applied {} units in batch {:?}", report.processed.len(), report.batch);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod catalog;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod secrets;
pub mod state;
pub mod storage;
pub mod unit;

pub use catalog::{MigrationUnit, UnitCatalog};
pub use config::{
    ConfShiftConfig, DocumentConfig, EnvironmentConfig, RollbackConfig, RollbackFailurePolicy,
    SaveConfig, SecretsConfig, SelectedEnvironment, TEMPLATE,
};
pub use context::MigrationContext;
pub use diff::{DiffLine, LineDiff, DEFAULT_CONTEXT, NO_CHANGES};
pub use error::{
    CatalogError, ConfigError, MigrationError, SecretError, StorageError, UnitError,
};
pub use orchestrator::{
    NoopObserver, Orchestrator, RollbackTarget, RunContext, RunObserver, RunReport,
};
pub use secrets::{
    key_to_env, resolve_secret, EnvSecretProvider, MemorySecretProvider, SecretProvider,
    SecretRules,
};
pub use state::{allowed_transitions, validate_transition, RunState};
pub use storage::{render_yaml, FileStore, MemoryStore, StreamStore, TreeStore};
pub use unit::{Direction, Entry, Unit, UnitRegistry, UnitResult};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing and running migration units
    pub use crate::{
        Direction, FileStore, MigrationContext, MigrationError, MigrationUnit, Orchestrator,
        RollbackTarget, RunContext, SecretRules, Unit, UnitCatalog, UnitError, UnitRegistry,
        UnitResult,
    };
    pub use confshift_tree::{Tree, ValueKind};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
