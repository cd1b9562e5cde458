use alloy_primitives::{b256, B256};

/// Keccak-256 hash of the empty byte string.
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Root hash of an empty trie.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Nanoseconds per second. Block timestamps are carried in nanoseconds while
/// the delegation clock runs in seconds.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;
