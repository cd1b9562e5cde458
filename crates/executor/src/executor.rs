use crate::{ExecutionError, GasPool, TransferVm, Vm};
use alloy_primitives::U256;
use std::sync::Arc;
use tracing::{debug, trace};
use ursa_chainspec::ChainSpec;
use ursa_consensus::dpos::DposContext;
use ursa_primitives::{create_address, Action, Block, Header, Log, Receipt, Transaction, TxType};
use ursa_state::StateDb;
use ursa_transaction_pool::intrinsic_gas;

/// What applying one transaction produced.
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
    /// The receipt, including the post-transaction intermediate root.
    pub receipt: Receipt,
    /// Gas consumed by this transaction.
    pub gas_used: u64,
    /// A delayed action emitted by the transaction (undelegation), to be
    /// queued by the caller.
    pub action: Option<Action>,
}

/// What replaying a whole block produced.
#[derive(Clone, Debug)]
pub struct BlockOutcome {
    /// One receipt per transaction, in order.
    pub receipts: Vec<Receipt>,
    /// All logs emitted by the block.
    pub logs: Vec<Log>,
    /// Total gas used.
    pub gas_used: u64,
    /// Delayed actions emitted during execution.
    pub actions: Vec<Action>,
}

/// Applies transactions and actions against a state view.
#[derive(Debug)]
pub struct Executor<V = TransferVm> {
    spec: Arc<ChainSpec>,
    vm: V,
}

impl Executor<TransferVm> {
    /// An executor with the transfer-only VM stand-in.
    pub fn new(spec: Arc<ChainSpec>) -> Self {
        Self { spec, vm: TransferVm }
    }
}

impl<V: Vm> Executor<V> {
    /// An executor delegating payload execution to `vm`.
    pub fn with_vm(spec: Arc<ChainSpec>, vm: V) -> Self {
        Self { spec, vm }
    }

    /// Releases the locked balance of every matured action's sender.
    pub fn apply_actions(
        &self,
        state: &mut StateDb,
        actions: &[Action],
    ) -> Result<(), ExecutionError> {
        for action in actions {
            let locked = state.get_locked_balance(action.sender);
            state.add_balance(action.sender, locked)?;
            state.set_locked_balance(action.sender, U256::ZERO)?;
            trace!(target: "executor", sender = %action.sender, %locked, "released matured redemption");
        }
        Ok(())
    }

    /// Applies one transaction, returning its receipt (carrying the
    /// intermediate root after this transaction alone) and any emitted
    /// delayed action. `cumulative_gas` accumulates across the block.
    pub fn apply_transaction(
        &self,
        dpos_ctx: &mut DposContext,
        gas_pool: &mut GasPool,
        state: &mut StateDb,
        header: &Header,
        tx: &Transaction,
        cumulative_gas: &mut u64,
    ) -> Result<ApplyOutcome, ExecutionError> {
        let (gas_used, failed, action) = if tx.tx_type == TxType::Binary {
            let (gas_used, failed) = self.transition(gas_pool, state, header, tx)?;
            (gas_used, failed, None)
        } else {
            let now = U256::from(header.timestamp_secs());
            let (failed, action) = self.apply_dpos_message(dpos_ctx, state, tx, now)?;
            (intrinsic_gas(&tx.payload, false), failed, action)
        };

        let root = state.intermediate_root(true)?;
        *cumulative_gas = cumulative_gas.saturating_add(gas_used);

        let tx_hash = tx.hash_slow();
        let mut receipt = Receipt::new(root, failed, *cumulative_gas);
        receipt.gas_used = gas_used;
        receipt.transaction_hash = tx_hash;
        if tx.is_contract_creation() {
            receipt.contract_address = Some(create_address(tx.sender, tx.nonce));
        }
        let receipt = receipt.with_logs(state.get_logs(tx_hash));

        trace!(target: "executor", hash = %tx_hash, gas_used, failed, "applied transaction");
        Ok(ApplyOutcome { receipt, gas_used, action })
    }

    /// The state transition of a binary transaction.
    fn transition(
        &self,
        gas_pool: &mut GasPool,
        state: &mut StateDb,
        header: &Header,
        tx: &Transaction,
    ) -> Result<(u64, bool), ExecutionError> {
        let sender = tx.sender;
        let nonce = state.get_nonce(sender);
        if nonce > tx.nonce {
            return Err(ExecutionError::NonceTooLow { expected: nonce, got: tx.nonce });
        }
        if nonce < tx.nonce {
            return Err(ExecutionError::NonceTooHigh { expected: nonce, got: tx.nonce });
        }
        if tx.gas_price < self.spec.min_gas_price {
            return Err(ExecutionError::Underpriced);
        }

        let gas_cost = tx
            .gas_price
            .checked_mul(U256::from(tx.gas_limit))
            .ok_or(ExecutionError::Overflow)?;
        let total_cost =
            gas_cost.checked_add(tx.value).ok_or(ExecutionError::Overflow)?;
        if state.get_balance(sender) < total_cost {
            return Err(ExecutionError::InsufficientBalance { address: sender });
        }

        gas_pool.sub_gas(tx.gas_limit)?;
        state.sub_balance(sender, gas_cost)?;

        let intrinsic = intrinsic_gas(&tx.payload, tx.is_contract_creation());
        let mut gas =
            tx.gas_limit.checked_sub(intrinsic).ok_or(ExecutionError::IntrinsicGas)?;

        state.set_nonce(sender, tx.nonce + 1)?;

        // Move the value, then hand the remainder of the gas to the VM; a
        // reverted payload takes the transfer down with it.
        let checkpoint = state.snapshot();
        let recipient = match tx.to() {
            Some(to) => *to,
            None => create_address(sender, tx.nonce),
        };
        state.sub_balance(sender, tx.value)?;
        state.add_balance(recipient, tx.value)?;

        let outcome = self.vm.execute(state, tx, header, gas)?;
        let failed = outcome.failed;
        if failed {
            state.revert_to_snapshot(checkpoint)?;
            gas = 0;
        } else {
            gas = outcome.gas_left;
        }

        // Half of the gas actually spent is refundable at most.
        let refund = ((tx.gas_limit - gas) / 2).min(state.get_refund());
        gas += refund;

        state.add_balance(sender, tx.gas_price * U256::from(gas))?;
        gas_pool.add_gas(gas);

        let gas_used = tx.gas_limit - gas;
        state.add_balance(header.miner, tx.gas_price * U256::from(gas_used))?;
        Ok((gas_used, failed))
    }

    /// The DPoS bookkeeping transactions. Returns the failure flag and any
    /// emitted delayed action.
    fn apply_dpos_message(
        &self,
        dpos_ctx: &mut DposContext,
        state: &mut StateDb,
        tx: &Transaction,
        now: U256,
    ) -> Result<(bool, Option<Action>), ExecutionError> {
        let sender = tx.sender;
        match tx.tx_type {
            TxType::LoginCandidate => {
                dpos_ctx.become_candidate(sender).map_err(ursa_state::StateError::from)?;
                Ok((false, None))
            }
            TxType::LogoutCandidate => {
                dpos_ctx.kickout_candidate(sender).map_err(ursa_state::StateError::from)?;
                Ok((false, None))
            }
            TxType::Delegate => {
                if tx.tos.len() as u64 > self.spec.max_votes {
                    debug!(target: "executor", sender = %sender, votes = tx.tos.len(), "delegation exceeds vote cap");
                    return Ok((true, None));
                }
                if state.get_balance(sender) < tx.value {
                    return Ok((true, None));
                }
                state.set_delegate_timestamp(sender, now)?;
                state.sub_balance(sender, tx.value)?;
                state.lock_balance(sender, tx.value)?;
                state.set_delegate_addresses(sender, tx.tos.clone())?;
                dpos_ctx.delegate(sender, &tx.tos).map_err(ursa_state::StateError::from)?;
                Ok((false, None))
            }
            TxType::UnDelegate => {
                // Re-stamp the delegate timestamp: redemption is measured
                // from undelegation, not from the original delegation.
                state.reset_delegate_timestamp(sender, now)?;
                let targets = state.get_delegate_addresses(sender);
                state.set_delegate_addresses(sender, Vec::new())?;
                dpos_ctx
                    .undelegate(sender, &targets)
                    .map_err(ursa_state::StateError::from)?;
                let action = Action::new(
                    tx.hash_slow(),
                    sender,
                    now,
                    self.spec.delay_duration_u256(),
                );
                Ok((false, Some(action)))
            }
            TxType::Redeem => {
                let stamped = state.get_delegate_timestamp(sender);
                if now < stamped.saturating_add(self.spec.delay_duration_u256()) {
                    return Ok((true, None));
                }
                let locked = state.get_locked_balance(sender);
                state.add_balance(sender, locked)?;
                state.unlock_balance(sender)?;
                Ok((false, None))
            }
            TxType::Binary => unreachable!("binary transactions take the transition path"),
        }
    }

    /// Replays a full block against `state`: matured actions first, then
    /// every transaction in order.
    pub fn execute_block(
        &self,
        block: &Block,
        state: &mut StateDb,
        dpos_ctx: &mut DposContext,
    ) -> Result<BlockOutcome, ExecutionError> {
        let mut gas_pool = GasPool::new(block.gas_limit());
        let mut cumulative_gas = 0;
        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut actions = Vec::new();

        self.apply_actions(state, &block.actions)?;
        for (index, tx) in block.transactions.iter().enumerate() {
            state.prepare(tx.hash_slow(), block.hash(), index as u64);
            let outcome = self.apply_transaction(
                dpos_ctx,
                &mut gas_pool,
                state,
                &block.header,
                tx,
                &mut cumulative_gas,
            )?;
            receipts.push(outcome.receipt);
            actions.extend(outcome.action);
        }

        let logs = receipts.iter().flat_map(|receipt| receipt.logs.clone()).collect();
        Ok(BlockOutcome { receipts, logs, gas_used: cumulative_gas, actions })
    }
}
