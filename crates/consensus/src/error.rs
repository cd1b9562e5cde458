use thiserror::Error;
use ursa_state::StateError;
use ursa_trie::TrieError;

/// Errors surfaced by consensus engines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The previous slot's block has not arrived yet.
    #[error("waiting for the previous block")]
    WaitForPrevBlock,
    /// The head block carries a timestamp at or past the slot being minted.
    #[error("minting a future block")]
    MintFutureBlock,
    /// The proposed mint timestamp is not aligned to a slot boundary.
    #[error("invalid time to mint the block")]
    InvalidMintBlockTime,
    /// The coinbase is not the validator owning this slot.
    #[error("invalid block validator")]
    InvalidBlockValidator,
    /// The validator set of the parent context is empty.
    #[error("empty validator set")]
    EmptyValidatorSet,
    /// A state operation failed; propagated unchanged.
    #[error(transparent)]
    State(#[from] StateError),
    /// A trie operation failed; propagated unchanged.
    #[error(transparent)]
    Trie(#[from] TrieError),
}

impl ConsensusError {
    /// Transient mint conditions: logged at debug level, the slot is
    /// skipped, no retry within the slot.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WaitForPrevBlock |
                Self::MintFutureBlock |
                Self::InvalidMintBlockTime |
                Self::InvalidBlockValidator
        )
    }

    /// Recoverable missing-trie-node condition: the mint loop retries at a
    /// fraction of the slot interval until cancelled.
    pub fn is_missing_node(&self) -> bool {
        match self {
            Self::Trie(err) => err.is_missing_node(),
            Self::State(err) => err.is_missing_node(),
            _ => false,
        }
    }
}
