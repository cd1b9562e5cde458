use thiserror::Error;
use ursa_consensus::ConsensusError;
use ursa_executor::ExecutionError;
use ursa_state::StateError;

/// Errors surfaced by the mint coordinator.
#[derive(Debug, Error)]
pub enum MinerError {
    /// The miner is already running.
    #[error("miner is running")]
    Busy,
    /// The node is synchronizing; minting is disarmed.
    #[error("node is syncing now")]
    Syncing,
    /// The consensus engine rejected or failed the mint.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    /// Transaction application failed irrecoverably.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// A state operation failed.
    #[error(transparent)]
    State(#[from] StateError),
}

impl MinerError {
    /// Whether block generation should be retried after a fraction of the
    /// slot: a trie node was not present yet.
    pub fn is_missing_node(&self) -> bool {
        match self {
            Self::Consensus(err) => err.is_missing_node(),
            Self::State(err) => err.is_missing_node(),
            Self::Execution(ExecutionError::State(err)) => err.is_missing_node(),
            _ => false,
        }
    }
}
