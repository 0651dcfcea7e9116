//! Error types for confshift core
//!
//! Provides error handling for:
//! - Unit discovery and scaffolding
//! - Document storage
//! - Secret lookup and validation
//! - Unit execution and run orchestration
//! - Configuration loading

use std::path::PathBuf;

use confshift_ledger::LedgerError;
use confshift_tree::{TreeError, ValueKind};

use crate::state::RunState;
use crate::unit::Direction;

/// Migration directory errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Identifier lacks the `YYYY_MM_DD_HHMMSS_` prefix
    #[error("unable to parse version from migration `{0}` (expected YYYY_MM_DD_HHMMSS_name)")]
    VersionParse(String),

    /// Name given to `scaffold` is not PascalCase alphanumeric
    #[error("migration name `{0}` is not valid: use PascalCase with letters and digits, starting with a capital")]
    InvalidUnitName(String),

    /// A unit with the same type name already exists
    #[error("a migration named `{0}` already exists")]
    DuplicateName(String),

    /// Directory could not be read or written
    #[error("migration directory I/O error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Document storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Document could not be read
    #[error("failed to read document from {location}: {source}")]
    Read {
        /// Store location
        location: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document could not be written
    #[error("failed to write document to {location}: {source}")]
    Write {
        /// Store location
        location: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid YAML
    #[error("unable to parse YAML from {location}: {source}")]
    Parse {
        /// Store location
        location: String,
        /// Parser error
        #[source]
        source: serde_yaml::Error,
    },

    /// Tree could not be rendered
    #[error("unable to render document: {0}")]
    Render(#[source] serde_yaml::Error),
}

/// Secret lookup and validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    /// Required secret is missing or empty
    #[error("missing required secret `{name}` ({hint})")]
    NotFound {
        /// Secret name
        name: String,
        /// Where the provider looked
        hint: String,
    },

    /// Secret does not convert to the requested kind
    #[error("secret `{name}` is not a valid {expected}")]
    Validation {
        /// Secret name
        name: String,
        /// Requested kind
        expected: ValueKind,
    },

    /// Provider failed
    #[error("secret provider error: {0}")]
    Provider(String),
}

/// Error returned by unit code
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// Selector or node error
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Secret error
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// Free-form failure
    #[error("{0}")]
    Message(String),
}

impl UnitError {
    /// Free-form failure
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Run configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("unable to read configuration {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the expected shape
    #[error("unable to parse configuration {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_yaml::Error,
    },

    /// Requested environment is not configured
    #[error("environment `{0}` is not configured")]
    UnknownEnvironment(String),

    /// Config is structurally valid but unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Unit lacks the entry point for the requested direction
    #[error("unable to find {direction} entry point in migration {unit}")]
    MissingEntryPoint {
        /// Unit identifier
        unit: String,
        /// Requested direction
        direction: Direction,
    },

    /// Discovered unit has no registered implementation
    #[error("migration {0} is not registered")]
    UnitNotRegistered(String),

    /// Unit code failed
    #[error("migration {unit} failed: {source}")]
    UnitFailed {
        /// Unit identifier
        unit: String,
        /// Unit error
        #[source]
        source: UnitError,
    },

    /// Re-applying after a failed rollback also failed
    #[error("compensating re-apply of {unit} failed after rollback error ({original}): {source}")]
    Compensation {
        /// Unit being re-applied
        unit: String,
        /// The rollback failure that triggered compensation
        original: Box<MigrationError>,
        /// Re-apply failure
        #[source]
        source: UnitError,
    },

    /// Run state machine violated
    #[error("illegal run state transition {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: RunState,
        /// Requested state
        to: RunState,
    },

    /// Catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Ledger error
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Tree error outside unit code
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl MigrationError {
    /// Wrap a unit failure
    pub fn unit_failed(unit: impl Into<String>, source: UnitError) -> Self {
        Self::UnitFailed {
            unit: unit.into(),
            source,
        }
    }

    /// Check whether the error was raised before any unit ran
    #[must_use]
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            Self::MissingEntryPoint { .. }
                | Self::UnitNotRegistered(_)
                | Self::Catalog(_)
                | Self::Ledger(LedgerError::InsufficientHistory { .. } | LedgerError::TargetNotFound(_))
        )
    }
}
