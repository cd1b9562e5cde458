use crate::{dpos::DposContextProto, transaction::Transaction, Action};
use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, U256};
use alloy_rlp::{Encodable, RlpDecodable, RlpEncodable};
use std::sync::OnceLock;

/// A block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Header {
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Address credited with the block reward.
    pub miner: Address,
    /// Root of the account trie after executing this block.
    pub state_root: B256,
    /// Root of the transaction trie.
    pub transactions_root: B256,
    /// Root of the receipt trie.
    pub receipts_root: B256,
    /// Roots of the DPoS context tries.
    pub dpos_context: DposContextProto,
    /// Bloom filter over all logs in the block.
    pub logs_bloom: Bloom,
    /// Difficulty of this block. Constant 1 under DPoS.
    pub difficulty: U256,
    /// Block height.
    pub height: u64,
    /// Maximum gas the block may consume.
    pub gas_limit: u64,
    /// Gas consumed by the block.
    pub gas_used: u64,
    /// Slot timestamp in nanoseconds.
    pub timestamp: u64,
    /// Arbitrary producer-supplied bytes.
    pub extra_data: Bytes,
}

impl Header {
    /// Keccak-256 hash of the RLP encoding of this header.
    pub fn hash_slow(&self) -> B256 {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        keccak256(&buf)
    }

    /// The header timestamp in whole seconds.
    pub fn timestamp_secs(&self) -> u64 {
        self.timestamp / crate::NANOS_PER_SEC
    }
}

/// A block: header plus the transactions and matured actions it applied.
#[derive(Clone, Debug, Default)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// Transactions executed in this block.
    pub transactions: Vec<Transaction>,
    /// Delayed actions executed in this block.
    pub actions: Vec<Action>,
    /// Lazily computed header hash.
    hash: OnceLock<B256>,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.transactions == other.transactions
            && self.actions == other.actions
    }
}

impl Eq for Block {}

impl Block {
    /// Assembles a block.
    pub fn new(header: Header, transactions: Vec<Transaction>, actions: Vec<Action>) -> Self {
        Self { header, transactions, actions, hash: OnceLock::new() }
    }

    /// A block carrying only a header.
    pub fn from_header(header: Header) -> Self {
        Self::new(header, Vec::new(), Vec::new())
    }

    /// The block hash, computed once and cached.
    pub fn hash(&self) -> B256 {
        *self.hash.get_or_init(|| self.header.hash_slow())
    }

    /// Block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Parent block hash.
    pub fn parent_hash(&self) -> B256 {
        self.header.parent_hash
    }

    /// Slot timestamp in nanoseconds.
    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// Gas limit of the block.
    pub fn gas_limit(&self) -> u64 {
        self.header.gas_limit
    }

    /// Gas used by the block.
    pub fn gas_used(&self) -> u64 {
        self.header.gas_used
    }

    /// Replaces the header, invalidating the cached hash.
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self.hash = OnceLock::new();
        self
    }
}

/// Computes the `transactions_root` / `receipts_root` style commitment used
/// by headers: the keccak hash of the concatenated RLP encodings, or the
/// empty-trie root for an empty list.
///
/// The full ordered-trie commitment lives with the ledger; headers only need
/// a deterministic digest here.
pub fn ordered_root<T: Encodable>(items: &[T]) -> B256 {
    if items.is_empty() {
        return crate::EMPTY_ROOT_HASH;
    }
    let mut buf = Vec::new();
    for item in items {
        item.encode(&mut buf);
    }
    keccak256(&buf)
}
