use alloy_primitives::{Address, Bloom, BloomInput, Bytes, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A log emitted during transaction execution.
///
/// The positional fields (block hash/number, transaction hash/index, log
/// index) are filled in by the state database when the log is recorded, not
/// by the emitter.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Log {
    /// Address of the emitting contract.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<B256>,
    /// Unindexed payload.
    pub data: Bytes,
    /// Hash of the transaction that emitted this log.
    pub transaction_hash: B256,
    /// Index of that transaction within its block.
    pub transaction_index: u64,
    /// Hash of the containing block.
    pub block_hash: B256,
    /// Height of the containing block.
    pub block_number: u64,
    /// Index of this log within the block.
    pub log_index: u64,
}

/// Accrues the bloom filter over a set of logs: the emitting address and
/// every topic contribute.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address.as_slice()));
        for topic in &log.topics {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }
    bloom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_contains_address_and_topics() {
        let log = Log {
            address: Address::repeat_byte(0x01),
            topics: vec![B256::repeat_byte(0x02)],
            ..Default::default()
        };
        let bloom = logs_bloom([&log]);
        assert!(bloom.contains_input(BloomInput::Raw(log.address.as_slice())));
        assert!(bloom.contains_input(BloomInput::Raw(log.topics[0].as_slice())));
        assert!(!bloom.contains_input(BloomInput::Raw(Address::repeat_byte(0x03).as_slice())));
    }
}
