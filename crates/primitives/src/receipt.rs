use crate::log::{logs_bloom, Log};
use alloy_primitives::{Address, Bloom, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// Post-execution summary of one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[rlp(trailing)]
pub struct Receipt {
    /// Intermediate state root after this transaction alone.
    pub state_root: B256,
    /// Whether execution failed.
    pub failed: bool,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Gas used by this transaction.
    pub gas_used: u64,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
    /// Bloom filter over `logs`.
    pub logs_bloom: Bloom,
    /// Hash of the transaction this receipt belongs to.
    pub transaction_hash: B256,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
}

impl Receipt {
    /// Creates a receipt for the execution outcome and recomputes its bloom
    /// from the attached logs.
    pub fn new(state_root: B256, failed: bool, cumulative_gas_used: u64) -> Self {
        Self { state_root, failed, cumulative_gas_used, ..Default::default() }
    }

    /// Attaches logs and derives the bloom filter.
    pub fn with_logs(mut self, logs: Vec<Log>) -> Self {
        self.logs_bloom = logs_bloom(logs.iter());
        self.logs = logs;
        self
    }
}
