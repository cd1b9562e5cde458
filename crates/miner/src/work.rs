use crate::MinerError;
use tracing::{debug, trace};
use ursa_chainspec::ChainSpec;
use ursa_consensus::{dpos::DposContext, MintBackend};
use ursa_executor::{Executor, GasPool};
use ursa_primitives::{Action, Block, Header, Receipt, Transaction};
use ursa_state::StateDb;
use ursa_transaction_pool::{TransactionsByPriceAndNonce, TX_GAS};

/// A block under assembly: the header being filled in, the state copy it
/// executes against, the parent-derived DPoS context, and everything
/// admitted so far.
#[derive(Debug)]
pub(crate) struct Work {
    pub(crate) header: Header,
    pub(crate) state: StateDb,
    pub(crate) dpos_ctx: DposContext,
    pub(crate) txs: Vec<Transaction>,
    pub(crate) receipts: Vec<Receipt>,
    pub(crate) actions: Vec<Action>,
    pub(crate) gas_pool: GasPool,
    pub(crate) cumulative_gas: u64,
}

impl Work {
    pub(crate) fn new(header: Header, state: StateDb, dpos_ctx: DposContext) -> Self {
        let gas_pool = GasPool::new(header.gas_limit);
        Self {
            header,
            state,
            dpos_ctx,
            txs: Vec::new(),
            receipts: Vec::new(),
            actions: Vec::new(),
            gas_pool,
            cumulative_gas: 0,
        }
    }

    /// The block as currently assembled, before finalization.
    pub(crate) fn pending_block(&self) -> Block {
        Block::new(self.header.clone(), self.txs.clone(), self.actions.clone())
    }

    /// Admits transactions in price-then-nonce order until the set is
    /// exhausted, the gas pool cannot fit another transaction, or the
    /// wall-clock `deadline_ns` passes. Skippable failures drop only the
    /// offending transaction; a nonce gap retains the sender for a later
    /// block; any other failure aborts the block.
    pub(crate) fn apply_transactions<B: MintBackend>(
        &mut self,
        executor: &Executor,
        ordered: &mut TransactionsByPriceAndNonce,
        deadline_ns: u64,
        backend: &B,
    ) -> Result<(), MinerError> {
        while let Some(tx) = ordered.peek().cloned() {
            if unix_now_ns() >= deadline_ns {
                debug!(target: "miner", "transaction admission deadline reached");
                break;
            }
            if self.gas_pool.gas() < TX_GAS {
                debug!(target: "miner", remaining = self.gas_pool.gas(), "gas pool below floor, halting admission");
                break;
            }

            let tx_hash = tx.hash_slow();
            self.state.prepare(tx_hash, self.header.parent_hash, self.txs.len() as u64);
            let checkpoint = self.state.snapshot();
            match executor.apply_transaction(
                &mut self.dpos_ctx,
                &mut self.gas_pool,
                &mut self.state,
                &self.header,
                &tx,
                &mut self.cumulative_gas,
            ) {
                Ok(outcome) => {
                    self.receipts.push(outcome.receipt);
                    if let Some(action) = outcome.action {
                        backend.queue_action(action);
                    }
                    self.txs.push(tx);
                    ordered.shift();
                }
                Err(err) if err.is_gas_limit_reached() => {
                    self.state.revert_to_snapshot(checkpoint)?;
                    trace!(target: "miner", hash = %tx_hash, "transaction exceeds remaining gas, dropping sender");
                    ordered.pop();
                }
                Err(err) if err.is_skippable() => {
                    self.state.revert_to_snapshot(checkpoint)?;
                    trace!(target: "miner", hash = %tx_hash, %err, "skipping transaction");
                    ordered.shift();
                }
                Err(err) if err.is_retainable() => {
                    self.state.revert_to_snapshot(checkpoint)?;
                    trace!(target: "miner", hash = %tx_hash, %err, "retaining gapped sender for a later block");
                    ordered.pop();
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.header.gas_used = self.cumulative_gas;
        Ok(())
    }
}

/// The gas limit for a child of `parent`: the parent limit decayed by
/// 1/1024, raised by 3/2 of the parent's usage over 1024, floored at the
/// minimum, and nudged back toward the genesis target while below it.
pub fn calc_gas_limit(parent: &Block, spec: &ChainSpec) -> u64 {
    let divisor = spec.gas_limit_bound_divisor.max(1);
    let contrib = (parent.gas_used() + parent.gas_used() / 2) / divisor;
    let decay = (parent.gas_limit() / divisor).saturating_sub(1);

    let mut limit = parent.gas_limit().saturating_sub(decay).saturating_add(contrib);
    if limit < spec.min_gas_limit {
        limit = spec.min_gas_limit;
    }
    if limit < spec.genesis_gas_limit {
        limit = parent.gas_limit().saturating_add(decay).min(spec.genesis_gas_limit);
    }
    limit
}

/// Wall-clock time in nanoseconds since the Unix epoch.
pub(crate) fn unix_now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ursa_primitives::Header;

    fn parent(gas_limit: u64, gas_used: u64) -> Block {
        Block::from_header(Header { gas_limit, gas_used, ..Default::default() })
    }

    #[test]
    fn gas_limit_decays_toward_usage() {
        let spec = ChainSpec::default();

        // An idle parent at the genesis target decays, then gets clamped
        // back up to the target.
        let limit = calc_gas_limit(&parent(spec.genesis_gas_limit, 0), &spec);
        assert_eq!(limit, spec.genesis_gas_limit);

        // A full parent above target grows by the contribution.
        let busy = parent(8_000_000, 8_000_000);
        let limit = calc_gas_limit(&busy, &spec);
        assert!(limit > 8_000_000);

        // The floor holds.
        let tiny = parent(spec.min_gas_limit, 0);
        assert!(calc_gas_limit(&tiny, &spec) >= spec.min_gas_limit);
    }

    #[test]
    fn gas_limit_moves_at_most_one_step() {
        let spec = ChainSpec::default();
        let p = parent(8_000_000, 4_000_000);
        let limit = calc_gas_limit(&p, &spec);
        let step = p.gas_limit() / spec.gas_limit_bound_divisor;
        assert!(limit.abs_diff(p.gas_limit()) <= step);
    }
}
