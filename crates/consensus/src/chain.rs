use alloy_primitives::{Address, B256, U256};
use std::{collections::HashMap, sync::Arc};
use ursa_chainspec::ChainSpec;
use ursa_primitives::{Action, Block, Receipt, Transaction};
use ursa_state::{StateDb, StateError};
use ursa_trie::TrieDb;

/// Read-only chain view exposed to consensus engines.
#[auto_impl::auto_impl(&, Arc)]
pub trait ChainReader: Send + Sync {
    /// The chain parameters.
    fn chain_spec(&self) -> Arc<ChainSpec>;

    /// The current head block.
    fn current_block(&self) -> Block;

    /// Looks a block up by its hash.
    fn block_by_hash(&self, hash: B256) -> Option<Block>;

    /// Opens the state rooted at `root`.
    fn state_at(&self, root: B256) -> Result<StateDb, StateError>;

    /// The trie node cache shared by all state views.
    fn trie_db(&self) -> Arc<TrieDb>;
}

/// The surface the mint coordinator drives a chain through.
#[auto_impl::auto_impl(&, Arc)]
pub trait MintBackend: ChainReader {
    /// The head block together with a state view rooted at it.
    fn current_info(&self) -> Result<(Block, StateDb), StateError>;

    /// Executable pool transactions, grouped per sender in nonce order.
    fn pending_transactions(&self) -> HashMap<Address, Vec<Transaction>>;

    /// Drains the delayed actions due at `now` (seconds).
    fn ready_actions(&self, now: U256) -> Vec<Action>;

    /// Queues a delayed action emitted during execution.
    fn queue_action(&self, action: Action);

    /// Persists a sealed block, its receipts and the state it was built on.
    fn write_block_with_state(
        &self,
        block: Block,
        receipts: Vec<Receipt>,
        state: StateDb,
    ) -> Result<(), StateError>;
}
