//! Ledger error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors from history queries and ledger persistence
#[derive(Debug, Error)]
pub enum LedgerError {
    /// More steps requested than in-scope history holds
    #[error("unable to roll back {requested} step(s): only {available} recorded")]
    InsufficientHistory {
        /// Steps requested
        requested: usize,
        /// In-scope records available
        available: usize,
    },

    /// Rollback target not present in history
    #[error("unable to find target `{0}` in history")]
    TargetNotFound(String),

    /// Batch id is not `<batch>.<iteration>`
    #[error("invalid batch id `{0}` (expected `<batch>.<iteration>`)")]
    InvalidBatchId(String),

    /// Ledger line could not be decoded
    #[error("invalid ledger record on line {line}: {reason}")]
    InvalidRecord {
        /// 1-based line number
        line: usize,
        /// Decoder message
        reason: String,
    },

    /// Record could not be encoded
    #[error("failed to encode ledger record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Ledger file could not be read or written
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        /// Ledger file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl LedgerError {
    /// Wrap an I/O error with the ledger path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_history_display() {
        let err = LedgerError::InsufficientHistory {
            requested: 5,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "unable to roll back 5 step(s): only 2 recorded"
        );
    }

    #[test]
    fn io_display_includes_path() {
        let err = LedgerError::io(
            "history.log",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("history.log"));
    }
}
