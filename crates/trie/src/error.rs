use alloy_primitives::B256;
use thiserror::Error;
use ursa_db::DatabaseError;

/// Errors surfaced by the trie layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// A node required to resolve the trie is neither cached nor persisted.
    ///
    /// Recoverable: callers that race a concurrent commit (the mint loop)
    /// retry on this variant.
    #[error("missing trie node {hash}")]
    MissingNode {
        /// Hash of the absent node.
        hash: B256,
    },
    /// A reference operation named a parent that is not in the cache.
    #[error("unknown parent node {parent}")]
    UnknownParent {
        /// Hash of the absent parent.
        parent: B256,
    },
    /// A cached or persisted node failed to decode.
    #[error("invalid trie node {hash}: {reason}")]
    InvalidNode {
        /// Hash of the malformed node.
        hash: B256,
        /// Decoder diagnostic.
        reason: &'static str,
    },
    /// The underlying key-value store failed; propagated unchanged.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl TrieError {
    /// Whether this error is a recoverable missing-node condition.
    pub const fn is_missing_node(&self) -> bool {
        matches!(self, Self::MissingNode { .. })
    }
}
