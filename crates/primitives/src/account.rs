use crate::constants::{EMPTY_ROOT_HASH, KECCAK_EMPTY};
use alloy_primitives::{Address, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// The per-address record stored in the account trie.
///
/// Next to the usual balance/nonce/code/storage quadruple this chain tracks
/// the stake that is locked up behind delegations: the locked balance, the
/// timestamp of the last (un)delegation and the currently voted-for
/// delegates.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Account {
    /// Number of transactions sent from this account.
    pub nonce: u64,
    /// Spendable balance.
    pub balance: U256,
    /// Balance locked behind a delegation, released by redemption.
    pub locked_balance: U256,
    /// Unix timestamp (seconds) of the last delegation or undelegation.
    pub delegate_timestamp: U256,
    /// Addresses this account currently delegates its stake to.
    pub delegate_addresses: Vec<Address>,
    /// Root of the account's storage trie.
    pub storage_root: B256,
    /// Keccak-256 hash of the account's bytecode.
    pub code_hash: B256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            locked_balance: U256::ZERO,
            delegate_timestamp: U256::ZERO,
            delegate_addresses: Vec::new(),
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        }
    }
}

impl Account {
    /// An account is empty when it has no nonce, no balance and no code.
    ///
    /// Empty accounts are pruned from the trie during finalisation when
    /// `delete_empty` is requested.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == KECCAK_EMPTY
    }

    /// Whether the account carries bytecode.
    pub fn has_code(&self) -> bool {
        self.code_hash != KECCAK_EMPTY
    }
}
