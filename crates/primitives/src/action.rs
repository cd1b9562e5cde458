use alloy_primitives::{Address, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A delayed state transition, queued at undelegation time and executed by
/// the block producer once its delay has matured.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Action {
    /// Hash of the transaction that queued this action.
    pub transaction_hash: B256,
    /// Account whose locked balance is released.
    pub sender: Address,
    /// Unix timestamp (seconds) at which the action was queued.
    pub gen_timestamp: U256,
    /// Seconds that must elapse before the action is due.
    pub delay: U256,
}

impl Action {
    /// Creates a new delayed redemption.
    pub fn new(transaction_hash: B256, sender: Address, gen_timestamp: U256, delay: U256) -> Self {
        Self { transaction_hash, sender, gen_timestamp, delay }
    }

    /// The timestamp at which this action matures.
    pub fn released_at(&self) -> U256 {
        self.gen_timestamp.saturating_add(self.delay)
    }

    /// Whether the action is due at `now` (seconds).
    pub fn is_due(&self, now: U256) -> bool {
        now >= self.released_at()
    }
}
