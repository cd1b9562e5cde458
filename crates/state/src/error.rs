use alloy_primitives::Address;
use thiserror::Error;
use ursa_trie::TrieError;

/// Errors surfaced by the state layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A snapshot revert named a revision that does not exist or was
    /// invalidated by an earlier revert.
    #[error("unknown or stale revision id {id}")]
    UnknownRevision {
        /// The offending revision id.
        id: usize,
    },
    /// A balance addition would overflow.
    #[error("balance overflow for {address}")]
    BalanceOverflow {
        /// Account whose balance overflowed.
        address: Address,
    },
    /// A balance subtraction would underflow.
    #[error("balance underflow for {address}")]
    BalanceUnderflow {
        /// Account whose balance underflowed.
        address: Address,
    },
    /// Account bytecode is referenced by its hash but cannot be resolved.
    #[error("missing code for hash {hash}")]
    MissingCode {
        /// The unresolvable code hash.
        hash: alloy_primitives::B256,
    },
    /// A trie operation failed; propagated unchanged.
    #[error(transparent)]
    Trie(#[from] TrieError),
}

impl StateError {
    /// Whether the underlying cause is a recoverable missing trie node.
    pub fn is_missing_node(&self) -> bool {
        matches!(self, Self::Trie(err) if err.is_missing_node())
    }
}
