//! Migration unit discovery
//!
//! Units live as `YYYY_MM_DD_HHMMSS_snake_name.rs` files in a migration
//! directory. The file stem is the unit identifier; its timestamp prefix is
//! the version, so sorting identifiers sorts units chronologically.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use confshift_ledger::HistoryLedger;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CatalogError;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4}_[0-9]{2}_[0-9]{2}_[0-9]{6})_([A-Za-z0-9_]+)$").expect("valid pattern")
});

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("valid pattern"));

/// One discovered or ledger-recorded migration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationUnit {
    id: String,
    version: String,
    type_name: String,
    source: Option<PathBuf>,
}

impl MigrationUnit {
    /// Parse an identifier such as `2020_03_31_225419_add_database`
    ///
    /// # Errors
    /// Returns `VersionParse` when the timestamp prefix or name is missing
    pub fn parse(id: &str) -> Result<Self, CatalogError> {
        let captures = ID_PATTERN
            .captures(id)
            .ok_or_else(|| CatalogError::VersionParse(id.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            version: captures[1].to_string(),
            type_name: pascal_case(&captures[2]),
            source: None,
        })
    }

    /// Attach the file the unit was discovered from
    #[must_use]
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Full identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `YYYY_MM_DD_HHMMSS` version prefix
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// PascalCase name derived from the snake_case remainder
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Source file, when discovered from a directory
    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl Ord for MigrationUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for MigrationUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for MigrationUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn pascal_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}

fn snake_case(pascal: &str) -> String {
    let mut out = String::with_capacity(pascal.len() + 4);
    for (i, c) in pascal.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Migration directory
#[derive(Debug, Clone)]
pub struct UnitCatalog {
    dir: PathBuf,
}

impl UnitCatalog {
    /// Catalog over `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Migration directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every unit in the directory, ascending by identifier
    ///
    /// A missing directory yields no units.
    ///
    /// # Errors
    /// Returns `VersionParse` for a `.rs` file without a timestamp prefix,
    /// or `Io` if the directory cannot be listed
    pub fn discover(&self) -> Result<Vec<MigrationUnit>, CatalogError> {
        if !self.dir.is_dir() {
            tracing::warn!(dir = %self.dir.display(), "migration directory not found");
            return Ok(Vec::new());
        }

        let io = |source| CatalogError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut units = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("rs") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == "mod" {
                continue;
            }
            units.push(MigrationUnit::parse(stem)?.with_source(&path));
        }
        units.sort();

        tracing::debug!(dir = %self.dir.display(), count = units.len(), "discovered migrations");
        Ok(units)
    }

    /// Discovered units not yet applied according to `ledger`
    ///
    /// # Errors
    /// Propagates discovery errors
    pub fn pending(&self, ledger: &HistoryLedger) -> Result<Vec<MigrationUnit>, CatalogError> {
        Ok(self
            .discover()?
            .into_iter()
            .filter(|unit| !ledger.is_applied(unit.id()))
            .collect())
    }

    /// Create a new unit source file named after `name` and `now`
    ///
    /// # Errors
    /// Returns `InvalidUnitName` unless `name` is PascalCase alphanumeric,
    /// `DuplicateName` if a unit with that type name exists, or `Io`
    pub fn scaffold(&self, name: &str, now: DateTime<Utc>) -> Result<PathBuf, CatalogError> {
        if !NAME_PATTERN.is_match(name) {
            return Err(CatalogError::InvalidUnitName(name.to_string()));
        }
        if self.discover()?.iter().any(|unit| unit.type_name() == name) {
            return Err(CatalogError::DuplicateName(name.to_string()));
        }

        let id = format!("{}_{}", now.format("%Y_%m_%d_%H%M%S"), snake_case(name));
        let path = self.dir.join(format!("{id}.rs"));
        let io = |source| CatalogError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io)?;
        fs::write(&path, unit_template(&id, name)).map_err(io)?;

        tracing::info!(path = %path.display(), "created migration");
        Ok(path)
    }
}

fn unit_template(id: &str, type_name: &str) -> String {
    format!(
        r#"//! {type_name}
//!
//! Register with:
//! `registry.register("{id}", Unit::new().with_apply(apply).with_revert(revert));`

use confshift_core::{{MigrationContext, UnitResult}};

/// Apply {type_name}
pub fn apply(ctx: &mut MigrationContext) -> UnitResult {{
    ctx.get(".")?;
    Ok(())
}}

/// Revert {type_name}
pub fn revert(ctx: &mut MigrationContext) -> UnitResult {{
    ctx.get(".")?;
    Ok(())
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use confshift_ledger::LedgerScope;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_identifier() {
        let unit = MigrationUnit::parse("2020_03_31_225419_add_database_config").unwrap();
        assert_eq!(unit.version(), "2020_03_31_225419");
        assert_eq!(unit.type_name(), "AddDatabaseConfig");
        assert!(unit.source().is_none());
    }

    #[test]
    fn parse_rejects_missing_version() {
        for bad in ["add_database", "2020_03_31_add", "2020_03_31_225419", "2020_03_31_225419_"] {
            assert!(
                matches!(MigrationUnit::parse(bad), Err(CatalogError::VersionParse(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn case_conversion() {
        assert_eq!(pascal_case("test_class_1"), "TestClass1");
        assert_eq!(snake_case("AddDbConfig2"), "add_db_config2");
    }

    #[test]
    fn discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "2020_04_01_000000_second.rs",
            "2020_03_01_000000_first.rs",
            "mod.rs",
            "README.md",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let catalog = UnitCatalog::new(dir.path());
        let units = catalog.discover().unwrap();
        let ids: Vec<_> = units.iter().map(MigrationUnit::id).collect();
        assert_eq!(ids, vec!["2020_03_01_000000_first", "2020_04_01_000000_second"]);
        assert!(units[0].source().is_some());

        let mut ledger = HistoryLedger::new(LedgerScope::new("c", "default"));
        ledger.record_apply("2020_03_01_000000_first", 1, 1, 0);
        let pending = catalog.pending(&ledger).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), "2020_04_01_000000_second");
    }

    #[test]
    fn discover_rejects_unversioned_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("helpers.rs"), "").unwrap();
        assert!(matches!(
            UnitCatalog::new(dir.path()).discover(),
            Err(CatalogError::VersionParse(_))
        ));
    }

    #[test]
    fn discover_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = UnitCatalog::new(dir.path().join("nope"));
        assert!(catalog.discover().unwrap().is_empty());
    }

    #[test]
    fn scaffold_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = UnitCatalog::new(dir.path().join("migrations"));
        let now = Utc.with_ymd_and_hms(2020, 3, 31, 22, 54, 19).unwrap();

        let path = catalog.scaffold("AddDatabaseConfig", now).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "2020_03_31_225419_add_database_config.rs"
        );
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("pub fn apply"));
        assert!(body.contains("2020_03_31_225419_add_database_config"));

        assert!(matches!(
            catalog.scaffold("AddDatabaseConfig", now),
            Err(CatalogError::DuplicateName(_))
        ));
        assert!(matches!(
            catalog.scaffold("add_thing", now),
            Err(CatalogError::InvalidUnitName(_))
        ));
    }
}
