use crate::{gas::intrinsic_gas, PoolConfig, PoolError, TxList};
use alloy_primitives::{Address, B256, U256};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use ursa_primitives::{Action, Transaction};
use ursa_state::StateDb;

/// Broadcast to subscribers whenever new executable transactions enter the
/// pool.
#[derive(Clone, Debug)]
pub struct NewTxsEvent {
    /// The newly admitted transactions.
    pub txs: Vec<Transaction>,
}

#[derive(Debug, Default)]
struct PoolInner {
    /// Executable transactions, per sender.
    pending: HashMap<Address, TxList>,
    /// All pooled transactions by hash.
    all: HashMap<B256, Transaction>,
    /// Delayed redemption actions awaiting maturity.
    actions: Vec<Action>,
}

/// The transaction pool.
///
/// Admission is validated against a caller-supplied state view: the pool
/// itself owns no chain state, only the pooled transactions and the queued
/// delayed actions.
#[derive(Debug)]
pub struct TxPool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    new_txs: broadcast::Sender<NewTxsEvent>,
}

impl TxPool {
    /// Creates an empty pool.
    pub fn new(config: PoolConfig) -> Self {
        let (new_txs, _) = broadcast::channel(config.event_buffer.max(1));
        Self { config, inner: Mutex::new(PoolInner::default()), new_txs }
    }

    /// Subscribes to admissions of new transactions.
    pub fn subscribe_new_txs(&self) -> broadcast::Receiver<NewTxsEvent> {
        self.new_txs.subscribe()
    }

    /// Validates `tx` against `state` and admits it into the pending set.
    pub fn add_transaction(
        &self,
        tx: Transaction,
        state: &mut StateDb,
    ) -> Result<(), PoolError> {
        let hash = tx.hash_slow();
        let mut inner = self.inner.lock();
        if inner.all.contains_key(&hash) {
            return Err(PoolError::AlreadyKnown);
        }
        self.validate(&tx, state, inner.all.len())?;

        let list = inner
            .pending
            .entry(tx.sender)
            .or_insert_with(|| TxList::new(true));
        let (inserted, replaced) = list.add(tx.clone(), self.config.price_bump);
        if !inserted {
            return Err(PoolError::ReplacementUnderpriced);
        }
        if let Some(replaced) = replaced {
            inner.all.remove(&replaced.hash_slow());
        }
        inner.all.insert(hash, tx.clone());
        drop(inner);

        trace!(target: "txpool", %hash, sender = %tx.sender, nonce = tx.nonce, "pooled transaction");
        let _ = self.new_txs.send(NewTxsEvent { txs: vec![tx] });
        Ok(())
    }

    fn validate(
        &self,
        tx: &Transaction,
        state: &mut StateDb,
        pooled: usize,
    ) -> Result<(), PoolError> {
        if pooled >= self.config.global_slots {
            return Err(PoolError::PoolFull);
        }
        if state.get_nonce(tx.sender) > tx.nonce {
            return Err(PoolError::NonceTooLow);
        }
        let cost = tx.cost().ok_or(PoolError::InsufficientFunds)?;
        if state.get_balance(tx.sender) < cost {
            return Err(PoolError::InsufficientFunds);
        }
        if tx.gas_limit < intrinsic_gas(&tx.payload, tx.is_contract_creation()) {
            return Err(PoolError::IntrinsicGasTooLow);
        }
        Ok(())
    }

    /// All executable transactions, grouped by sender in nonce order.
    pub fn pending(&self) -> HashMap<Address, Vec<Transaction>> {
        let inner = self.inner.lock();
        inner
            .pending
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(sender, list)| (*sender, list.flatten()))
            .collect()
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().all.len()
    }

    /// Whether the pool holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().all.is_empty()
    }

    /// Removes the block's transactions from the pool after inclusion, and
    /// drops anything their senders can no longer execute.
    pub fn remove_included(&self, txs: &[Transaction]) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        for tx in txs {
            inner.all.remove(&tx.hash_slow());
            let emptied = if let Some(list) = inner.pending.get_mut(&tx.sender) {
                for stale in list.forward(tx.nonce + 1) {
                    inner.all.remove(&stale.hash_slow());
                }
                list.is_empty()
            } else {
                false
            };
            if emptied {
                inner.pending.remove(&tx.sender);
            }
        }
        debug!(target: "txpool", remaining = inner.all.len(), "pruned included transactions");
    }

    /// Queues a delayed redemption action.
    pub fn add_action(&self, action: Action) {
        trace!(
            target: "txpool",
            sender = %action.sender,
            released_at = %action.released_at(),
            "queued delayed action"
        );
        self.inner.lock().actions.push(action);
    }

    /// Drains and returns every action due at `now` (seconds).
    pub fn ready_actions(&self, now: U256) -> Vec<Action> {
        let mut inner = self.inner.lock();
        let (due, pending): (Vec<Action>, Vec<Action>) =
            inner.actions.drain(..).partition(|action| action.is_due(now));
        inner.actions = pending;
        due
    }

    /// Number of queued actions, due or not.
    pub fn action_count(&self) -> usize {
        self.inner.lock().actions.len()
    }
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
