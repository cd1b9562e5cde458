use crate::object::StateObject;
use alloy_primitives::{Address, Bytes, B256, U256};
use std::collections::HashMap;

/// One reversible state mutation. Each variant captures exactly the data
/// needed to undo itself.
#[derive(Clone, Debug)]
pub(crate) enum JournalEntry {
    /// A fresh account came into existence.
    CreateObject { address: Address },
    /// An existing account was replaced wholesale; `prev` restores it.
    ResetObject { prev: Box<StateObject> },
    /// An account was marked suicided and its balance zeroed.
    SuicideChange { address: Address, prev_suicided: bool, prev_balance: U256 },
    /// An account was touched without an observable change.
    TouchChange { address: Address, prev_touched: bool },
    /// Balance changed.
    BalanceChange { address: Address, prev: U256 },
    /// Locked balance changed.
    LockedBalanceChange { address: Address, prev: U256 },
    /// Nonce changed.
    NonceChange { address: Address, prev: u64 },
    /// A storage slot was written.
    StorageChange { address: Address, key: B256, prev: B256 },
    /// Code was set.
    CodeChange { address: Address, prev_hash: B256, prev_code: Bytes },
    /// The gas refund counter changed.
    RefundChange { prev: u64 },
    /// A log was recorded under `tx_hash`.
    LogChange { tx_hash: B256 },
    /// A preimage was recorded.
    PreimageChange { hash: B256 },
    /// The delegate timestamp changed.
    DelegateTimestampChange { address: Address, prev: U256 },
    /// The delegate set changed.
    DelegateAddressesChange { address: Address, prev: Vec<Address> },
}

impl JournalEntry {
    /// The account this entry dirties, if any.
    pub(crate) fn address(&self) -> Option<Address> {
        match self {
            Self::CreateObject { address } |
            Self::SuicideChange { address, .. } |
            Self::TouchChange { address, .. } |
            Self::BalanceChange { address, .. } |
            Self::LockedBalanceChange { address, .. } |
            Self::NonceChange { address, .. } |
            Self::StorageChange { address, .. } |
            Self::CodeChange { address, .. } |
            Self::DelegateTimestampChange { address, .. } |
            Self::DelegateAddressesChange { address, .. } => Some(*address),
            Self::ResetObject { prev } => Some(prev.address()),
            Self::RefundChange { .. } | Self::LogChange { .. } | Self::PreimageChange { .. } => {
                None
            }
        }
    }
}

/// The linear journal: the ordered mutation history since the last
/// finalisation, plus per-account dirty counts used to decide when a revert
/// may drop an account wholesale.
#[derive(Clone, Debug, Default)]
pub(crate) struct Journal {
    pub(crate) entries: Vec<JournalEntry>,
    pub(crate) dirties: HashMap<Address, usize>,
}

impl Journal {
    pub(crate) fn append(&mut self, entry: JournalEntry) {
        if let Some(address) = entry.address() {
            *self.dirties.entry(address).or_insert(0) += 1;
        }
        self.entries.push(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops the dirty count contributed by one undone entry.
    pub(crate) fn undirty(&mut self, address: Address) {
        if let Some(count) = self.dirties.get_mut(&address) {
            *count -= 1;
            if *count == 0 {
                self.dirties.remove(&address);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.dirties.clear();
    }
}
