//! Secret lookup boundary
//!
//! Providers only fetch raw strings. Defaults, presence and kind checks
//! are applied by [`resolve_secret`] so every provider behaves the same.

use std::collections::HashMap;
use std::env::{self, VarError};
use std::sync::Arc;

use confshift_tree::{Tree, ValueKind};
use parking_lot::RwLock;

use crate::error::SecretError;

/// Source of raw secret values
pub trait SecretProvider {
    /// Fetch `name`, `None` when absent
    ///
    /// # Errors
    /// Returns `Provider` when the backend fails
    fn fetch(&self, name: &str) -> Result<Option<String>, SecretError>;

    /// Where `name` is looked up, for error messages
    fn locate(&self, name: &str) -> String {
        name.to_string()
    }

    /// Short adapter name
    fn name(&self) -> &'static str;
}

/// Map a secret path to an environment variable name
///
/// `/Api/Production/S3/access_key_id` becomes `Api_Production_S3_AccessKeyId`:
/// a lowercase snake_case last segment is camel-cased, then runs of `/`,
/// `.` and `-` become `_` and outer underscores are trimmed.
#[must_use]
pub fn key_to_env(key: &str) -> String {
    let camelized = match key.rsplit_once('/') {
        Some((head, tail))
            if !tail.is_empty()
                && tail
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') =>
        {
            let tail: String = tail
                .split('_')
                .map(|part| {
                    let mut chars = part.chars();
                    chars.next().map_or_else(String::new, |first| {
                        first.to_ascii_uppercase().to_string() + chars.as_str()
                    })
                })
                .collect();
            format!("{head}/{tail}")
        }
        _ => key.to_string(),
    };

    let mut out = String::with_capacity(camelized.len());
    let mut in_separator = false;
    for c in camelized.chars() {
        if matches!(c, '/' | '.' | '-') {
            if !in_separator {
                out.push('_');
            }
            in_separator = true;
        } else {
            out.push(c);
            in_separator = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Reads secrets from process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretProvider;

impl SecretProvider for EnvSecretProvider {
    fn fetch(&self, name: &str) -> Result<Option<String>, SecretError> {
        let variable = key_to_env(name);
        match env::var(&variable) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(SecretError::Provider(format!(
                "environment variable `{variable}` is not valid unicode"
            ))),
        }
    }

    fn locate(&self, name: &str) -> String {
        format!("environment variable `{}`", key_to_env(name))
    }

    fn name(&self) -> &'static str {
        "env"
    }
}

/// In-memory secrets; clones share the same values
#[derive(Debug, Clone, Default)]
pub struct MemorySecretProvider {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySecretProvider {
    /// Empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a value
    #[must_use]
    pub fn with(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a value
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(name.into(), value.into());
    }
}

impl SecretProvider for MemorySecretProvider {
    fn fetch(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.read().get(name).cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Post-fetch rules for one secret
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecretRules {
    /// Value used when the provider has none
    pub default: Option<Tree>,
    /// Reject missing or empty values
    pub required: bool,
    /// Convert and validate as this kind
    pub kind: Option<ValueKind>,
}

impl SecretRules {
    /// No rules
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a default value
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Tree>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark as required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// With a kind
    #[must_use]
    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Fetch `name` from `provider` and apply `rules`
///
/// A missing value without default or requirement resolves to null.
///
/// # Errors
/// Returns `NotFound` for a missing or empty required value, `Validation`
/// when the value does not convert to the requested kind, or provider errors
pub fn resolve_secret(
    provider: &dyn SecretProvider,
    name: &str,
    rules: &SecretRules,
) -> Result<Tree, SecretError> {
    let value = match provider.fetch(name)? {
        Some(raw) => Tree::String(raw),
        None => rules.default.clone().unwrap_or(Tree::Null),
    };

    let empty = value.is_null() || value.as_str() == Some("");
    if rules.required && empty {
        return Err(SecretError::NotFound {
            name: name.to_string(),
            hint: provider.locate(name),
        });
    }

    match rules.kind {
        Some(kind) if !value.is_null() => convert(name, value, kind),
        _ => Ok(value),
    }
}

fn convert(name: &str, value: Tree, kind: ValueKind) -> Result<Tree, SecretError> {
    let invalid = || SecretError::Validation {
        name: name.to_string(),
        expected: kind,
    };

    if kind.matches(&value) {
        return Ok(value);
    }
    let text = match &value {
        Tree::String(s) => s.trim().to_string(),
        Tree::Integer(_) | Tree::Float(_) | Tree::Bool(_) => value.to_string(),
        _ => return Err(invalid()),
    };

    match kind {
        ValueKind::String => Ok(Tree::String(text)),
        ValueKind::Integer => text
            .parse::<i64>()
            .ok()
            .filter(|n| n.to_string() == text)
            .map(Tree::Integer)
            .ok_or_else(invalid),
        ValueKind::Float => text
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .map(Tree::Float)
            .ok_or_else(invalid),
        ValueKind::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(Tree::Bool(true)),
            "false" | "0" | "off" => Ok(Tree::Bool(false)),
            _ => Err(invalid()),
        },
    }
}
