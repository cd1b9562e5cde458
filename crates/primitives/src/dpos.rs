use crate::constants::EMPTY_ROOT_HASH;
use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// The trie roots of a block's DPoS context.
///
/// Each header commits to the candidate, delegation, vote and mint-count
/// tries; the full context is re-opened from these roots when a child block
/// is produced or validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct DposContextProto {
    /// Root of the candidate trie (also carries the active validator list).
    pub candidate_root: B256,
    /// Root of the delegation trie (delegator -> candidates).
    pub delegate_root: B256,
    /// Root of the vote trie (candidate -> accumulated stake).
    pub vote_root: B256,
    /// Root of the mint-count trie (validator -> blocks minted).
    pub mint_cnt_root: B256,
}

impl Default for DposContextProto {
    fn default() -> Self {
        Self {
            candidate_root: EMPTY_ROOT_HASH,
            delegate_root: EMPTY_ROOT_HASH,
            vote_root: EMPTY_ROOT_HASH,
            mint_cnt_root: EMPTY_ROOT_HASH,
        }
    }
}
