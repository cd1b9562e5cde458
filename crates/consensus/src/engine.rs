use crate::{dpos::DposContext, ChainReader, ConsensusError};
use alloy_primitives::{Address, U256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ursa_primitives::{Action, Block, Header, Receipt, Transaction};
use ursa_state::StateDb;

/// The contract a consensus engine implements toward the core.
///
/// The DPoS engine lives in this crate; a proof-of-work engine is an
/// external collaborator implementing the same surface (the `threads` and
/// `hash_reporter` seal parameters exist for it).
pub trait Engine: Send + Sync {
    /// Checks whether `coinbase` is entitled to produce the block of
    /// `slot_timestamp` (nanoseconds) on top of `head`.
    fn check_validator(
        &self,
        chain: &dyn ChainReader,
        head: &Block,
        coinbase: Address,
        slot_timestamp: u64,
    ) -> Result<(), ConsensusError>;

    /// The difficulty of a block minted at `now` on top of `parent`.
    fn calc_difficulty(&self, now: u64, parent: &Header) -> U256;

    /// Settles all block-level state transitions (rewards, mint
    /// accounting), folds the roots into the header and assembles the
    /// final block.
    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        chain: &dyn ChainReader,
        header: Header,
        state: &mut StateDb,
        txs: Vec<Transaction>,
        actions: Vec<Action>,
        receipts: &[Receipt],
        dpos_ctx: &mut DposContext,
    ) -> Result<Block, ConsensusError>;

    /// Seals a finalized block. Returns `Ok(None)` promptly once `cancel`
    /// fires.
    fn seal(
        &self,
        chain: &dyn ChainReader,
        block: Block,
        cancel: &CancellationToken,
        threads: usize,
        hash_reporter: Option<mpsc::UnboundedSender<u64>>,
    ) -> Result<Option<Block>, ConsensusError>;
}
