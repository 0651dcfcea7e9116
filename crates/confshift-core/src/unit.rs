//! Unit implementations and their registry
//!
//! Discovery only yields identifiers. The code behind each identifier is
//! registered up front and looked up by identifier when a run needs it.

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;

use crate::context::MigrationContext;
use crate::error::{MigrationError, UnitError};

/// Result of one unit entry point
pub type UnitResult = Result<(), UnitError>;

/// A unit entry point
pub type Entry = Box<dyn Fn(&mut MigrationContext) -> UnitResult>;

/// Run direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Apply pending units
    Apply,
    /// Revert applied units
    Revert,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("apply"),
            Self::Revert => f.write_str("revert"),
        }
    }
}

/// Apply and revert entry points of one unit
#[derive(Default)]
pub struct Unit {
    apply: Option<Entry>,
    revert: Option<Entry>,
}

impl Unit {
    /// Unit with no entry points
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the apply entry point
    #[must_use]
    pub fn with_apply<F>(mut self, apply: F) -> Self
    where
        F: Fn(&mut MigrationContext) -> UnitResult + 'static,
    {
        self.apply = Some(Box::new(apply));
        self
    }

    /// Set the revert entry point
    #[must_use]
    pub fn with_revert<F>(mut self, revert: F) -> Self
    where
        F: Fn(&mut MigrationContext) -> UnitResult + 'static,
    {
        self.revert = Some(Box::new(revert));
        self
    }

    /// Entry point for `direction`, if present
    #[must_use]
    pub fn entry(&self, direction: Direction) -> Option<&Entry> {
        match direction {
            Direction::Apply => self.apply.as_ref(),
            Direction::Revert => self.revert.as_ref(),
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("apply", &self.apply.is_some())
            .field("revert", &self.revert.is_some())
            .finish()
    }
}

/// Units by identifier
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: IndexMap<String, Unit>,
}

impl UnitRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `unit` under `id`, replacing any previous registration
    pub fn register(&mut self, id: impl Into<String>, unit: Unit) -> &mut Self {
        let id = id.into();
        if self.units.insert(id.clone(), unit).is_some() {
            tracing::warn!(unit = %id, "replaced existing unit registration");
        }
        self
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, unit: Unit) -> Self {
        self.register(id, unit);
        self
    }

    /// Look up a unit
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Unit> {
        self.units.get(id)
    }

    /// Check for a registration
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    /// Registered identifiers in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Number of registered units
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check for an empty registry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Entry point of `id` for `direction`
    ///
    /// # Errors
    /// Returns `UnitNotRegistered` or `MissingEntryPoint`
    pub fn entry(&self, id: &str, direction: Direction) -> Result<&Entry, MigrationError> {
        let unit = self
            .get(id)
            .ok_or_else(|| MigrationError::UnitNotRegistered(id.to_string()))?;
        unit.entry(direction)
            .ok_or_else(|| MigrationError::MissingEntryPoint {
                unit: id.to_string(),
                direction,
            })
    }
}
