//! The delegated-proof-of-stake engine.
//!
//! Time is sliced into fixed slots of `ChainSpec::block_interval`
//! nanoseconds; each slot belongs to exactly one validator, chosen
//! round-robin from the validator list carried by the parent block's
//! context.

mod context;

pub use context::DposContext;

use crate::{ChainReader, ConsensusError, Engine};
use alloy_primitives::{Address, U256};
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use ursa_chainspec::ChainSpec;
use ursa_primitives::{logs_bloom, ordered_root, Action, Block, Header, Receipt, Transaction};
use ursa_state::StateDb;

/// The first slot boundary at or after `now`.
pub fn next_slot(now: u64, interval: u64) -> u64 {
    now.div_ceil(interval) * interval
}

/// The last slot boundary strictly before `now`.
pub fn prev_slot(now: u64, interval: u64) -> u64 {
    (now.saturating_sub(1) / interval) * interval
}

/// The delegated-proof-of-stake engine.
#[derive(Debug)]
pub struct Dpos {
    spec: Arc<ChainSpec>,
}

impl Dpos {
    /// Creates the engine over the chain parameters.
    pub fn new(spec: Arc<ChainSpec>) -> Self {
        Self { spec }
    }

    /// The chain parameters this engine runs under.
    pub fn spec(&self) -> &Arc<ChainSpec> {
        &self.spec
    }

    /// Whether a block for the slot at `now` may be minted on top of `head`:
    /// the head must belong to an earlier slot, and either close out the
    /// previous slot or leave only a tail fraction of the current one.
    fn check_deadline(&self, head: &Block, now: u64) -> Result<(), ConsensusError> {
        let interval = self.spec.block_interval;
        let next = next_slot(now, interval);
        let prev = prev_slot(now, interval);
        if head.timestamp() >= next {
            return Err(ConsensusError::MintFutureBlock);
        }
        if head.timestamp() == prev || next - now <= interval / 10 {
            return Ok(());
        }
        Err(ConsensusError::WaitForPrevBlock)
    }

    /// The validator owning the slot at `slot_timestamp`.
    fn slot_validator(
        &self,
        chain: &dyn ChainReader,
        head: &Block,
        slot_timestamp: u64,
    ) -> Result<Address, ConsensusError> {
        let mut ctx = DposContext::from_proto(chain.trie_db(), &head.header.dpos_context)?;
        let validators = ctx.validators()?;
        if validators.is_empty() {
            return Err(ConsensusError::EmptyValidatorSet);
        }
        let slot = slot_timestamp / self.spec.block_interval;
        Ok(validators[(slot % validators.len() as u64) as usize])
    }
}

impl Engine for Dpos {
    fn check_validator(
        &self,
        chain: &dyn ChainReader,
        head: &Block,
        coinbase: Address,
        slot_timestamp: u64,
    ) -> Result<(), ConsensusError> {
        if slot_timestamp % self.spec.block_interval != 0 {
            return Err(ConsensusError::InvalidMintBlockTime);
        }
        self.check_deadline(head, slot_timestamp)?;
        let expected = self.slot_validator(chain, head, slot_timestamp)?;
        if expected != coinbase {
            trace!(target: "dpos", %expected, %coinbase, slot_timestamp, "slot owned by another validator");
            return Err(ConsensusError::InvalidBlockValidator);
        }
        Ok(())
    }

    fn calc_difficulty(&self, _now: u64, _parent: &Header) -> U256 {
        // Every slot has exactly one entitled producer; difficulty carries
        // no information under DPoS.
        U256::from(1)
    }

    fn finalize(
        &self,
        _chain: &dyn ChainReader,
        mut header: Header,
        state: &mut StateDb,
        txs: Vec<Transaction>,
        actions: Vec<Action>,
        receipts: &[Receipt],
        dpos_ctx: &mut DposContext,
    ) -> Result<Block, ConsensusError> {
        state.add_balance(header.miner, self.spec.block_reward)?;
        dpos_ctx.update_mint_cnt(header.miner)?;

        header.state_root = state.intermediate_root(true)?;
        header.dpos_context = dpos_ctx.commit()?;
        header.transactions_root = ordered_root(&txs);
        header.receipts_root = ordered_root(receipts);
        header.logs_bloom = logs_bloom(receipts.iter().flat_map(|receipt| receipt.logs.iter()));
        Ok(Block::new(header, txs, actions))
    }

    fn seal(
        &self,
        _chain: &dyn ChainReader,
        block: Block,
        cancel: &CancellationToken,
        _threads: usize,
        _hash_reporter: Option<mpsc::UnboundedSender<u64>>,
    ) -> Result<Option<Block>, ConsensusError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        // A slot's block may not be sealed before its slot has started.
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos() as u64);
        if now < block.timestamp() {
            return Err(ConsensusError::MintFutureBlock);
        }
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use ursa_db::MemoryKeyValueStore;
    use ursa_state::StateError;
    use ursa_trie::TrieDb;

    struct TestChain {
        spec: Arc<ChainSpec>,
        db: Arc<TrieDb>,
        head: Block,
    }

    impl ChainReader for TestChain {
        fn chain_spec(&self) -> Arc<ChainSpec> {
            self.spec.clone()
        }

        fn current_block(&self) -> Block {
            self.head.clone()
        }

        fn block_by_hash(&self, hash: B256) -> Option<Block> {
            (self.head.hash() == hash).then(|| self.head.clone())
        }

        fn state_at(&self, root: B256) -> Result<StateDb, StateError> {
            StateDb::new(root, self.db.clone())
        }

        fn trie_db(&self) -> Arc<TrieDb> {
            self.db.clone()
        }
    }

    fn chain_with_validators(validators: &[Address]) -> (TestChain, Dpos) {
        let spec = Arc::new(ChainSpec::default());
        let db = Arc::new(TrieDb::new(Arc::new(MemoryKeyValueStore::new())));
        let mut ctx = DposContext::new(db.clone());
        ctx.set_validators(validators).unwrap();
        let proto = ctx.commit().unwrap();

        let header = Header {
            dpos_context: proto,
            timestamp: 0,
            ..Default::default()
        };
        let chain = TestChain { spec: spec.clone(), db, head: Block::from_header(header) };
        (chain, Dpos::new(spec))
    }

    #[test]
    fn slot_math() {
        assert_eq!(next_slot(0, 10), 0);
        assert_eq!(next_slot(1, 10), 10);
        assert_eq!(next_slot(10, 10), 10);
        assert_eq!(next_slot(11, 10), 20);
        assert_eq!(prev_slot(0, 10), 0);
        assert_eq!(prev_slot(10, 10), 0);
        assert_eq!(prev_slot(11, 10), 10);
        assert_eq!(prev_slot(20, 10), 10);
    }

    #[test]
    fn misaligned_timestamp_is_invalid_mint_time() {
        let validator = Address::repeat_byte(0x01);
        let (chain, engine) = chain_with_validators(&[validator]);
        let err = engine
            .check_validator(&chain, &chain.current_block(), validator, 7)
            .unwrap_err();
        assert_eq!(err, ConsensusError::InvalidMintBlockTime);
        assert!(err.is_transient());
    }

    #[test]
    fn validator_rotation_follows_slots() {
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        let (chain, engine) = chain_with_validators(&[a, b]);
        let interval = chain.spec.block_interval;
        let head = chain.current_block();

        // Slot 1 belongs to `b`, slot 2 to `a` again.
        engine.check_validator(&chain, &head, b, interval).unwrap();
        assert_eq!(
            engine.check_validator(&chain, &head, a, interval).unwrap_err(),
            ConsensusError::InvalidBlockValidator
        );
        engine.check_validator(&chain, &head, a, 2 * interval).unwrap_err();
    }

    #[test]
    fn head_at_or_past_slot_is_future_block() {
        let validator = Address::repeat_byte(0x01);
        let (mut chain, engine) = chain_with_validators(&[validator]);
        let interval = chain.spec.block_interval;

        let mut header = chain.head.header.clone();
        header.timestamp = interval;
        chain.head = Block::from_header(header);

        let err = engine
            .check_validator(&chain, &chain.current_block(), validator, interval)
            .unwrap_err();
        assert_eq!(err, ConsensusError::MintFutureBlock);
    }

    #[test]
    fn seal_honors_cancellation() {
        let validator = Address::repeat_byte(0x01);
        let (chain, engine) = chain_with_validators(&[validator]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sealed = engine
            .seal(&chain, chain.current_block(), &cancel, 0, None)
            .unwrap();
        assert!(sealed.is_none());
    }

    #[test]
    fn finalize_rewards_miner_and_counts_mint() {
        let validator = Address::repeat_byte(0x01);
        let (chain, engine) = chain_with_validators(&[validator]);
        let mut state = chain.state_at(B256::ZERO).unwrap();
        let mut ctx =
            DposContext::from_proto(chain.trie_db(), &chain.head.header.dpos_context).unwrap();

        let header = Header { miner: validator, height: 1, ..Default::default() };
        let block = engine
            .finalize(&chain, header, &mut state, Vec::new(), Vec::new(), &[], &mut ctx)
            .unwrap();

        assert_eq!(state.get_balance(validator), chain.spec.block_reward);
        assert_eq!(ctx.mint_cnt(validator).unwrap(), 1);
        assert_ne!(block.header.state_root, B256::ZERO);
    }

    #[test]
    fn validator_rotation_is_deterministic_after_reopen() {
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        let (chain, engine) = chain_with_validators(&[a, b]);
        let interval = chain.spec.block_interval;
        let head = chain.current_block();

        for slot in 1u64..6 {
            let expected = if slot % 2 == 0 { a } else { b };
            engine
                .check_validator(&chain, &head, expected, slot * interval)
                .unwrap();
        }
    }
}
