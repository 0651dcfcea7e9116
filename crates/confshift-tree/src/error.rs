//! Error types for tree addressing and mutation

use thiserror::Error;

/// Errors raised while parsing selectors or mutating nodes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Selector string is malformed
    #[error("invalid selector `{selector}`: {reason}")]
    SelectorSyntax {
        /// Offending selector
        selector: String,
        /// What is wrong with it
        reason: String,
    },

    /// A selector step has no matching child
    #[error("selector `{selector}` not found in document (no match for `{step}`)")]
    SelectorNotFound {
        /// Selector being resolved
        selector: String,
        /// First step without a match
        step: String,
    },

    /// Value cannot be added to a scalar node
    #[error("unable to add value to scalar node of `{selector}`")]
    NotMergeable {
        /// Selector of the node
        selector: String,
    },

    /// Key or value to remove is absent
    #[error("unable to remove key `{key}` from node `{selector}`")]
    KeyNotFound {
        /// Selector of the node
        selector: String,
        /// Missing key or value
        key: String,
    },

    /// Value kind name not recognized
    #[error("unknown value kind `{0}` (expected integer, string, float or boolean)")]
    UnknownValueKind(String),
}

impl TreeError {
    /// Create a selector syntax error
    pub fn syntax(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SelectorSyntax {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Create a selector-not-found error
    pub fn not_found(selector: impl Into<String>, step: impl Into<String>) -> Self {
        Self::SelectorNotFound {
            selector: selector.into(),
            step: step.into(),
        }
    }

    /// Check whether this is a lookup failure rather than a malformed request
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SelectorNotFound { .. } | Self::KeyNotFound { .. })
    }
}

/// Result alias for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;
