use alloy_primitives::Address;
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};
use ursa_primitives::Transaction;

/// The head transaction of one sender inside the price heap.
#[derive(Clone, Debug)]
struct PricedHead(Transaction);

impl PartialEq for PricedHead {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PricedHead {}

impl PartialOrd for PricedHead {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PricedHead {
    fn cmp(&self, other: &Self) -> Ordering {
        // Highest price wins; equal prices break deterministically toward
        // the numerically smaller sender.
        self.0
            .gas_price
            .cmp(&other.0.gas_price)
            .then_with(|| other.0.sender.cmp(&self.0.sender))
    }
}

/// Transactions from many senders, yielded best-price-first while preserving
/// per-sender nonce order.
///
/// Given the same input set the iteration order is fully deterministic:
/// price descending, ties broken by sender address, nonce ascending within a
/// sender.
#[derive(Debug, Default)]
pub struct TransactionsByPriceAndNonce {
    txs: HashMap<Address, VecDeque<Transaction>>,
    heads: BinaryHeap<PricedHead>,
}

impl TransactionsByPriceAndNonce {
    /// Builds the ordered view. Each sender's transactions are sorted by
    /// nonce; their cheapest-nonce transaction seeds the price heap.
    pub fn new(pending: HashMap<Address, Vec<Transaction>>) -> Self {
        let mut txs = HashMap::with_capacity(pending.len());
        let mut heads = BinaryHeap::with_capacity(pending.len());
        for (sender, mut list) in pending {
            list.sort_by_key(|tx| tx.nonce);
            let mut queue: VecDeque<Transaction> = list.into();
            if let Some(head) = queue.pop_front() {
                heads.push(PricedHead(head));
            }
            if !queue.is_empty() {
                txs.insert(sender, queue);
            }
        }
        Self { txs, heads }
    }

    /// The best transaction, without consuming it.
    pub fn peek(&self) -> Option<&Transaction> {
        self.heads.peek().map(|head| &head.0)
    }

    /// Consumes the best transaction and promotes the same sender's next
    /// nonce into the heap.
    pub fn shift(&mut self) -> Option<Transaction> {
        let head = self.heads.pop()?.0;
        let mut exhausted = false;
        if let Some(queue) = self.txs.get_mut(&head.sender) {
            if let Some(next) = queue.pop_front() {
                self.heads.push(PricedHead(next));
            }
            exhausted = queue.is_empty();
        }
        if exhausted {
            self.txs.remove(&head.sender);
        }
        Some(head)
    }

    /// Drops the best transaction and the rest of its sender's queue. Used
    /// when a sender's transaction cannot execute and the successors would
    /// be gapped anyway.
    pub fn pop(&mut self) -> Option<Transaction> {
        let head = self.heads.pop()?.0;
        self.txs.remove(&head.sender);
        Some(head)
    }

    /// Whether any transaction remains.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn tx(sender: Address, nonce: u64, gas_price: u64) -> Transaction {
        Transaction {
            sender,
            nonce,
            gas_price: U256::from(gas_price),
            gas_limit: 21_000,
            ..Default::default()
        }
    }

    #[test]
    fn yields_price_then_nonce() {
        let alice = Address::repeat_byte(0x01);
        let bob = Address::repeat_byte(0x02);
        let mut pending = HashMap::new();
        pending.insert(alice, vec![tx(alice, 1, 50), tx(alice, 0, 100)]);
        pending.insert(bob, vec![tx(bob, 0, 75)]);

        let mut ordered = TransactionsByPriceAndNonce::new(pending);
        let mut seen = Vec::new();
        while let Some(tx) = ordered.shift() {
            seen.push((tx.sender, tx.nonce));
        }
        // Alice's 100 first, then Bob's 75, then Alice's 50 (nonce order
        // keeps it behind its predecessor).
        assert_eq!(seen, vec![(alice, 0), (bob, 0), (alice, 1)]);
    }

    #[test]
    fn equal_prices_break_by_sender_deterministically() {
        let alice = Address::repeat_byte(0x01);
        let bob = Address::repeat_byte(0x02);
        let mut pending = HashMap::new();
        pending.insert(bob, vec![tx(bob, 0, 10)]);
        pending.insert(alice, vec![tx(alice, 0, 10)]);

        let mut ordered = TransactionsByPriceAndNonce::new(pending);
        assert_eq!(ordered.shift().unwrap().sender, alice);
        assert_eq!(ordered.shift().unwrap().sender, bob);
        assert!(ordered.is_empty());
    }

    #[test]
    fn pop_drops_the_whole_sender() {
        let alice = Address::repeat_byte(0x01);
        let bob = Address::repeat_byte(0x02);
        let mut pending = HashMap::new();
        pending.insert(alice, vec![tx(alice, 0, 100), tx(alice, 1, 100)]);
        pending.insert(bob, vec![tx(bob, 0, 50)]);

        let mut ordered = TransactionsByPriceAndNonce::new(pending);
        assert_eq!(ordered.pop().unwrap().sender, alice);
        assert_eq!(ordered.shift().unwrap().sender, bob);
        assert!(ordered.is_empty());
    }
}
