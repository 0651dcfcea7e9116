//! Content digest of a document tree
//!
//! Used to report whether a run changed the document without keeping both
//! renderings around.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::value::Tree;

/// Blake3 digest over the canonical JSON encoding of a tree
///
/// Two trees with equal content and equal key order share a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeDigest([u8; 32]);

impl TreeDigest {
    /// Digest `tree`
    #[must_use]
    pub fn of(tree: &Tree) -> Self {
        let bytes = serde_json::to_vec(tree).unwrap_or_else(|_| tree.to_string().into_bytes());
        Self(*blake3::hash(&bytes).as_bytes())
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 12 hex characters, for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl Display for TreeDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
