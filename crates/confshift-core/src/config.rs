//! Run configuration
//!
//! A single YAML file describes where history is kept and, per environment,
//! where units live, which document they edit and where secrets come from.
//! Relative paths are resolved against the directory of the config file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use confshift_ledger::BatchGrouping;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::secrets::{EnvSecretProvider, SecretProvider};
use crate::storage::{FileStore, StreamStore, TreeStore};

/// Config file written by `init`
pub const TEMPLATE: &str = "\
# config_id: billing
history_file: ./history.log
default_environment: default
environments:
  default:
    migrations: ./migrations
    document:
      adapter: file
      path: ./config.yaml
    secrets:
      adapter: env
save:
  remove_empty_nodes: false
  mask_values: false
  backup: false
rollback:
  on_failure: keep_reverted
  last_batch: batch_number
";

/// Identifier used when neither the file nor its name provide one
const FALLBACK_CONFIG_ID: &str = "config";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfShiftConfig {
    /// Ledger identifier; defaults to the config file stem
    pub config_id: Option<String>,
    /// Ledger file
    pub history_file: PathBuf,
    /// Environment used when none is requested
    pub default_environment: String,
    /// Environments by name
    pub environments: IndexMap<String, EnvironmentConfig>,
    /// Save post-processing
    pub save: SaveConfig,
    /// Rollback behaviour
    pub rollback: RollbackConfig,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl ConfShiftConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With config identifier
    #[inline]
    #[must_use]
    pub fn with_config_id(mut self, id: impl Into<String>) -> Self {
        self.config_id = Some(id.into());
        self
    }

    /// With history file
    #[inline]
    #[must_use]
    pub fn with_history_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_file = path.into();
        self
    }

    /// With an environment, replacing one of the same name
    #[must_use]
    pub fn with_environment(mut self, name: impl Into<String>, env: EnvironmentConfig) -> Self {
        self.environments.insert(name.into(), env);
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

    /// With the directory relative paths are resolved against
    #[inline]
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Load from a YAML file
    ///
    /// # Errors
    /// Returns `Read`/`Parse` for unreadable files and `Invalid` when no
    /// environment is configured
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.config_id.is_none() {
            config.config_id = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.validate()?;

        tracing::debug!(path = %path.display(), config_id = config.config_id(), "loaded configuration");
        Ok(config)
    }

    /// Parse YAML text; an empty document yields the defaults
    ///
    /// # Errors
    /// Returns the parser error
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Write [`TEMPLATE`] to `path`
    ///
    /// # Errors
    /// Returns `Invalid` if the file already exists, `Read` on I/O failure
    pub fn write_template(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ConfigError::Invalid(format!(
                "{} already exists",
                path.display()
            )));
        }
        let io_err = |source: io::Error| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, TEMPLATE).map_err(io_err)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.environments.is_empty() {
            return Err(ConfigError::Invalid("no environments configured".to_string()));
        }
        Ok(())
    }

    /// Config identifier
    #[must_use]
    pub fn config_id(&self) -> &str {
        self.config_id.as_deref().unwrap_or(FALLBACK_CONFIG_ID)
    }

    /// `path` resolved against the config file directory
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Resolved ledger path
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.resolve_path(&self.history_file)
    }

    /// Select an environment; `None` picks the default with a warning
    ///
    /// # Errors
    /// Returns `UnknownEnvironment` if the name is not configured
    pub fn environment(&self, name: Option<&str>) -> Result<SelectedEnvironment<'_>, ConfigError> {
        let requested = name.unwrap_or_else(|| {
            tracing::warn!(
                environment = %self.default_environment,
                "no environment given, using default"
            );
            &self.default_environment
        });
        let (selected, config) = self
            .environments
            .get_key_value(requested)
            .ok_or_else(|| ConfigError::UnknownEnvironment(requested.to_string()))?;
        Ok(SelectedEnvironment {
            name: selected,
            config,
            defaulted: name.is_none(),
            root: self,
        })
    }
}

impl Default for ConfShiftConfig {
    fn default() -> Self {
        let mut environments = IndexMap::new();
        environments.insert("default".to_string(), EnvironmentConfig::default());
        Self {
            config_id: None,
            history_file: PathBuf::from("./history.log"),
            default_environment: "default".to_string(),
            environments,
            save: SaveConfig::default(),
            rollback: RollbackConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

/// One named environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Unit directory
    pub migrations: PathBuf,
    /// Document location
    pub document: DocumentConfig,
    /// Secret source
    pub secrets: SecretsConfig,
}

impl EnvironmentConfig {
    /// Create default environment
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With unit directory
    #[inline]
    #[must_use]
    pub fn with_migrations(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations = dir.into();
        self
    }

    /// With document location
    #[inline]
    #[must_use]
    pub fn with_document(mut self, document: DocumentConfig) -> Self {
        self.document = document;
        self
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            migrations: PathBuf::from("./migrations"),
            document: DocumentConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

/// Document adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "snake_case")]
pub enum DocumentConfig {
    /// YAML file
    File {
        /// File path
        path: PathBuf,
    },
    /// Standard input, written to standard output
    Stream,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("./config.yaml"),
        }
    }
}

/// Secret adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "snake_case")]
pub enum SecretsConfig {
    /// Process environment variables
    #[default]
    Env,
}

impl SecretsConfig {
    /// Instantiate the provider
    #[must_use]
    pub fn provider(self) -> Arc<dyn SecretProvider> {
        match self {
            Self::Env => Arc::new(EnvSecretProvider),
        }
    }
}

/// Post-processing applied on save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Drop empty containers
    pub remove_empty_nodes: bool,
    /// Replace scalar values with a placeholder
    pub mask_values: bool,
    /// Keep a timestamped copy of the previous file
    pub backup: bool,
}

impl SaveConfig {
    /// With empty-node removal
    #[inline]
    #[must_use]
    pub fn with_remove_empty_nodes(mut self, enabled: bool) -> Self {
        self.remove_empty_nodes = enabled;
        self
    }

    /// With value masking
    #[inline]
    #[must_use]
    pub fn with_mask_values(mut self, enabled: bool) -> Self {
        self.mask_values = enabled;
        self
    }

    /// With backups
    #[inline]
    #[must_use]
    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup = enabled;
        self
    }
}

/// What happens to already-reverted units when a rollback fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackFailurePolicy {
    /// Leave them reverted and drop their records
    #[default]
    KeepReverted,
    /// Re-apply them and restore their records
    Compensate,
}

/// Rollback behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Failure handling
    pub on_failure: RollbackFailurePolicy,
    /// Grouping of the last batch
    pub last_batch: BatchGrouping,
}

/// An environment picked from a [`ConfShiftConfig`]
#[derive(Debug, Clone, Copy)]
pub struct SelectedEnvironment<'a> {
    /// Environment name
    pub name: &'a str,
    /// Environment settings
    pub config: &'a EnvironmentConfig,
    /// Picked because no name was given
    pub defaulted: bool,
    root: &'a ConfShiftConfig,
}

impl SelectedEnvironment<'_> {
    /// Resolved unit directory
    #[must_use]
    pub fn migrations_dir(&self) -> PathBuf {
        self.root.resolve_path(&self.config.migrations)
    }

    /// Open the document store
    #[must_use]
    pub fn open_store(&self) -> Box<dyn TreeStore> {
        match &self.config.document {
            DocumentConfig::File { path } => Box::new(
                FileStore::new(self.root.resolve_path(path)).with_backup(self.root.save.backup),
            ),
            DocumentConfig::Stream => Box::new(StreamStore::new(io::stdin(), io::stdout())),
        }
    }

    /// Document path for file adapters
    #[must_use]
    pub fn document_path(&self) -> Option<PathBuf> {
        match &self.config.document {
            DocumentConfig::File { path } => Some(self.root.resolve_path(path)),
            DocumentConfig::Stream => None,
        }
    }

    /// Secret provider
    #[must_use]
    pub fn secrets(&self) -> Arc<dyn SecretProvider> {
        self.config.secrets.provider()
    }
}
