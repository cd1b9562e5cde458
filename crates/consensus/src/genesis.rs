use crate::{dpos::DposContext, ConsensusError};
use alloy_primitives::B256;
use std::sync::Arc;
use tracing::info;
use ursa_chainspec::ChainSpec;
use ursa_primitives::{ordered_root, Block, Header, Receipt, Transaction};
use ursa_state::StateDb;
use ursa_trie::TrieDb;

/// Materializes the genesis block: applies the allocation through a fresh
/// state, seeds the initial DPoS context with the genesis validators, and
/// commits both so the block's roots are durable in the backing store.
///
/// Building the same specification twice produces byte-identical blocks.
pub fn build_genesis(spec: &ChainSpec, db: &Arc<TrieDb>) -> Result<Block, ConsensusError> {
    let mut state = StateDb::new(B256::ZERO, db.clone())?;
    for (address, account) in &spec.genesis.alloc {
        state.set_balance(*address, account.balance)?;
        if !account.locked_balance.is_zero() {
            state.set_locked_balance(*address, account.locked_balance)?;
        }
        if account.nonce != 0 {
            state.set_nonce(*address, account.nonce)?;
        }
        if !account.code.is_empty() {
            state.set_code(*address, account.code.clone())?;
        }
        for (key, value) in &account.storage {
            state.set_state(*address, *key, *value)?;
        }
    }

    let mut ctx = DposContext::new(db.clone());
    ctx.set_validators(&spec.genesis.validators)?;
    for validator in &spec.genesis.validators {
        ctx.become_candidate(*validator)?;
    }
    let dpos_context = ctx.commit()?;
    let state_root = state.commit(false)?;

    // The state commit only flushes the account sub-DAG; pin and flush the
    // context tries so a restart can reopen them from disk.
    for root in [
        dpos_context.candidate_root,
        dpos_context.delegate_root,
        dpos_context.vote_root,
        dpos_context.mint_cnt_root,
    ] {
        if root != ursa_primitives::EMPTY_ROOT_HASH {
            db.reference(root, B256::ZERO)?;
            db.commit(root, false)?;
        }
    }

    let header = Header {
        parent_hash: B256::ZERO,
        state_root,
        transactions_root: ordered_root::<Transaction>(&[]),
        receipts_root: ordered_root::<Receipt>(&[]),
        dpos_context,
        difficulty: spec.genesis.difficulty,
        height: 0,
        gas_limit: spec.genesis.gas_limit,
        timestamp: spec.genesis.timestamp,
        extra_data: spec.genesis.extra_data.clone(),
        ..Default::default()
    };
    let block = Block::from_header(header);
    info!(target: "consensus", hash = %block.hash(), %state_root, "built genesis block");
    Ok(block)
}
