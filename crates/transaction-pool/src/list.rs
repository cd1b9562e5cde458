use alloy_primitives::U256;
use std::collections::BTreeMap;
use ursa_primitives::Transaction;

/// A nonce-sorted map of transactions from a single sender.
#[derive(Clone, Debug, Default)]
pub struct TxSortedMap {
    items: BTreeMap<u64, Transaction>,
}

impl TxSortedMap {
    /// The transaction at `nonce`, if any.
    pub fn get(&self, nonce: u64) -> Option<&Transaction> {
        self.items.get(&nonce)
    }

    /// Inserts `tx`, replacing any previous transaction at the same nonce.
    pub fn put(&mut self, tx: Transaction) {
        self.items.insert(tx.nonce, tx);
    }

    /// Removes and returns every transaction with a nonce below `threshold`.
    pub fn forward(&mut self, threshold: u64) -> Vec<Transaction> {
        let keep = self.items.split_off(&threshold);
        std::mem::replace(&mut self.items, keep).into_values().collect()
    }

    /// Removes and returns every transaction matching `predicate`.
    pub fn filter(
        &mut self,
        mut predicate: impl FnMut(&Transaction) -> bool,
    ) -> Vec<Transaction> {
        let nonces: Vec<u64> = self
            .items
            .iter()
            .filter(|(_, tx)| predicate(tx))
            .map(|(nonce, _)| *nonce)
            .collect();
        nonces.into_iter().filter_map(|nonce| self.items.remove(&nonce)).collect()
    }

    /// Trims the map down to `limit` transactions, dropping and returning
    /// the highest-nonced overflow.
    pub fn cap(&mut self, limit: usize) -> Vec<Transaction> {
        let mut dropped = Vec::new();
        while self.items.len() > limit {
            let highest = *self.items.keys().next_back().expect("len > limit >= 0");
            dropped.push(self.items.remove(&highest).expect("key just observed"));
        }
        dropped.reverse();
        dropped
    }

    /// Removes the transaction at `nonce`, reporting whether one existed.
    pub fn remove(&mut self, nonce: u64) -> bool {
        self.items.remove(&nonce).is_some()
    }

    /// Removes and returns the maximal run of consecutive transactions
    /// starting at `start`.
    pub fn ready(&mut self, start: u64) -> Vec<Transaction> {
        let mut ready = Vec::new();
        let mut next = start;
        while let Some(tx) = self.items.remove(&next) {
            ready.push(tx);
            next += 1;
        }
        ready
    }

    /// Number of transactions in the map.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All transactions in nonce order.
    pub fn flatten(&self) -> Vec<Transaction> {
        self.items.values().cloned().collect()
    }
}

/// The list of transactions belonging to one account, nonce-sorted with
/// price-bump replacement.
///
/// In strict mode (pending lists) nonces are expected to be contiguous and
/// removal of a transaction invalidates everything after it.
#[derive(Clone, Debug)]
pub struct TxList {
    strict: bool,
    txs: TxSortedMap,
}

impl TxList {
    /// Creates a list; `strict` selects pending-list semantics.
    pub fn new(strict: bool) -> Self {
        Self { strict, txs: TxSortedMap::default() }
    }

    /// Whether the list holds a transaction with the exact nonce.
    pub fn overlaps(&self, tx: &Transaction) -> bool {
        self.txs.get(tx.nonce).is_some()
    }

    /// Tries to insert `tx`. A same-nonce occupant is replaced only when the
    /// new price exceeds the old by at least `price_bump` percent. Returns
    /// whether the insert happened and the transaction it displaced.
    pub fn add(&mut self, tx: Transaction, price_bump: u64) -> (bool, Option<Transaction>) {
        let replaced = self.txs.get(tx.nonce).cloned();
        if let Some(old) = &replaced {
            let threshold = old.gas_price * U256::from(100 + price_bump) / U256::from(100);
            if old.gas_price >= tx.gas_price || tx.gas_price < threshold {
                return (false, None);
            }
        }
        self.txs.put(tx);
        (true, replaced)
    }

    /// Drops every transaction below `threshold`.
    pub fn forward(&mut self, threshold: u64) -> Vec<Transaction> {
        self.txs.forward(threshold)
    }

    /// Drops transactions above the given cost or gas caps; in strict mode
    /// every transaction after the lowest dropped nonce is invalidated too.
    pub fn filter(&mut self, cost_limit: U256, gas_limit: u64) -> (Vec<Transaction>, Vec<Transaction>) {
        let removed = self.txs.filter(|tx| {
            tx.cost().map_or(true, |cost| cost > cost_limit) || tx.gas_limit > gas_limit
        });
        if removed.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let mut invalids = Vec::new();
        if self.strict {
            let lowest = removed.iter().map(|tx| tx.nonce).min().expect("non-empty");
            invalids = self.txs.filter(|tx| tx.nonce > lowest);
        }
        (removed, invalids)
    }

    /// Trims the list to `limit` transactions.
    pub fn cap(&mut self, limit: usize) -> Vec<Transaction> {
        self.txs.cap(limit)
    }

    /// Removes the transaction with `tx`'s nonce. In strict mode returns the
    /// now-gapped tail as invalidated.
    pub fn remove(&mut self, tx: &Transaction) -> (bool, Vec<Transaction>) {
        let nonce = tx.nonce;
        if !self.txs.remove(nonce) {
            return (false, Vec::new());
        }
        let invalids =
            if self.strict { self.txs.filter(|tx| tx.nonce > nonce) } else { Vec::new() };
        (true, invalids)
    }

    /// Removes and returns the run of consecutive transactions from `start`.
    pub fn ready(&mut self, start: u64) -> Vec<Transaction> {
        self.txs.ready(start)
    }

    /// Number of transactions in the list.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// All transactions in nonce order.
    pub fn flatten(&self) -> Vec<Transaction> {
        self.txs.flatten()
    }

    /// The nonce-sorted backing map. Test support.
    pub fn txs(&self) -> &TxSortedMap {
        &self.txs
    }
}
