use crate::StateError;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::Encodable;
use std::{collections::HashMap, sync::Arc};
use ursa_primitives::{Account, KECCAK_EMPTY};
use ursa_trie::{SecureTrie, TrieDb};

/// One account held live in the state database.
///
/// Mutators here are raw: journaling happens at the [`StateDb`] level, which
/// records the previous value before delegating down.
///
/// [`StateDb`]: crate::StateDb
#[derive(Clone, Debug)]
pub(crate) struct StateObject {
    address: Address,
    pub(crate) data: Account,

    /// Lazily loaded bytecode.
    code: Option<Bytes>,
    pub(crate) dirty_code: bool,

    /// Lazily opened storage trie rooted at `data.storage_root`.
    storage_trie: Option<SecureTrie>,
    /// Read-through cache of storage slots.
    pub(crate) cached_storage: HashMap<B256, B256>,
    /// Slots written since the last finalisation, to be flushed into the
    /// storage trie.
    pub(crate) dirty_storage: HashMap<B256, B256>,

    pub(crate) suicided: bool,
    pub(crate) deleted: bool,
    pub(crate) touched: bool,
}

impl StateObject {
    pub(crate) fn new(address: Address, data: Account) -> Self {
        Self {
            address,
            data,
            code: None,
            dirty_code: false,
            storage_trie: None,
            cached_storage: HashMap::new(),
            dirty_storage: HashMap::new(),
            suicided: false,
            deleted: false,
            touched: false,
        }
    }

    pub(crate) fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn balance(&self) -> U256 {
        self.data.balance
    }

    pub(crate) fn set_balance(&mut self, balance: U256) {
        self.data.balance = balance;
    }

    pub(crate) fn locked_balance(&self) -> U256 {
        self.data.locked_balance
    }

    pub(crate) fn set_locked_balance(&mut self, locked: U256) {
        self.data.locked_balance = locked;
    }

    pub(crate) fn nonce(&self) -> u64 {
        self.data.nonce
    }

    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.data.nonce = nonce;
    }

    pub(crate) fn delegate_timestamp(&self) -> U256 {
        self.data.delegate_timestamp
    }

    pub(crate) fn set_delegate_timestamp(&mut self, timestamp: U256) {
        self.data.delegate_timestamp = timestamp;
    }

    pub(crate) fn delegate_addresses(&self) -> &[Address] {
        &self.data.delegate_addresses
    }

    pub(crate) fn set_delegate_addresses(&mut self, addresses: Vec<Address>) {
        self.data.delegate_addresses = addresses;
    }

    pub(crate) fn code_hash(&self) -> B256 {
        self.data.code_hash
    }

    /// The account bytecode, loaded through the node cache on first access.
    pub(crate) fn code(&mut self, db: &Arc<TrieDb>) -> Result<Bytes, StateError> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        if self.data.code_hash == KECCAK_EMPTY {
            return Ok(Bytes::new());
        }
        let code = db
            .node(self.data.code_hash)?
            .ok_or(StateError::MissingCode { hash: self.data.code_hash })?;
        self.code = Some(code.clone());
        Ok(code)
    }

    pub(crate) fn set_code(&mut self, code_hash: B256, code: Bytes) {
        self.code = Some(code);
        self.data.code_hash = code_hash;
        self.dirty_code = true;
    }

    pub(crate) fn cached_code(&self) -> Option<&Bytes> {
        self.code.as_ref()
    }

    /// Reads a storage slot: dirty writes first, then the read cache, then
    /// the storage trie.
    pub(crate) fn storage(&mut self, db: &Arc<TrieDb>, key: B256) -> Result<B256, StateError> {
        if let Some(value) = self.dirty_storage.get(&key) {
            return Ok(*value);
        }
        if let Some(value) = self.cached_storage.get(&key) {
            return Ok(*value);
        }
        let value = match self.storage_trie(db)?.get(key.as_slice())? {
            Some(encoded) => decode_storage_value(&encoded)?,
            None => B256::ZERO,
        };
        self.cached_storage.insert(key, value);
        Ok(value)
    }

    /// Stages a storage write; flushed into the trie on finalisation.
    pub(crate) fn set_storage(&mut self, key: B256, value: B256) {
        self.dirty_storage.insert(key, value);
    }

    pub(crate) fn mark_suicided(&mut self) {
        self.suicided = true;
    }

    /// Folds dirty slots into the storage trie and the read cache. Zero
    /// values delete their slot.
    fn update_trie(&mut self, db: &Arc<TrieDb>) -> Result<(), StateError> {
        if self.dirty_storage.is_empty() {
            return Ok(());
        }
        let dirty: Vec<(B256, B256)> = self.dirty_storage.drain().collect();
        let trie = self.storage_trie(db)?;
        for (key, value) in &dirty {
            if value.is_zero() {
                trie.remove(key.as_slice())?;
            } else {
                trie.insert(key.as_slice(), &encode_storage_value(*value))?;
            }
        }
        self.cached_storage.extend(dirty);
        Ok(())
    }

    /// Flushes dirty storage and refreshes the account's storage root
    /// without staging anything in the node cache.
    pub(crate) fn update_root(&mut self, db: &Arc<TrieDb>) -> Result<(), StateError> {
        self.update_trie(db)?;
        if let Some(trie) = &self.storage_trie {
            self.data.storage_root = trie.hash();
        }
        Ok(())
    }

    /// Flushes dirty storage and commits the storage trie into the node
    /// cache, updating the account's storage root.
    pub(crate) fn commit_trie(&mut self, db: &Arc<TrieDb>) -> Result<(), StateError> {
        self.update_trie(db)?;
        if let Some(trie) = &mut self.storage_trie {
            self.data.storage_root = trie.commit(None)?;
        }
        Ok(())
    }

    /// The opened storage trie, created from the account's storage root on
    /// first use.
    pub(crate) fn storage_trie(
        &mut self,
        db: &Arc<TrieDb>,
    ) -> Result<&mut SecureTrie, StateError> {
        if self.storage_trie.is_none() {
            self.storage_trie = Some(SecureTrie::new(self.data.storage_root, db.clone())?);
        }
        Ok(self.storage_trie.as_mut().expect("just opened"))
    }

    /// RLP encoding of the account record, as stored in the account trie.
    pub(crate) fn encoded_account(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.data.encode(&mut buf);
        buf
    }
}

/// Storage values are stored RLP-encoded with leading zeroes trimmed.
pub(crate) fn encode_storage_value(value: B256) -> Vec<u8> {
    let trimmed: &[u8] = {
        let bytes = value.as_slice();
        let start = bytes.iter().position(|byte| *byte != 0).unwrap_or(bytes.len());
        &bytes[start..]
    };
    let mut buf = Vec::with_capacity(trimmed.len() + 1);
    trimmed.encode(&mut buf);
    buf
}

/// Inverse of [`encode_storage_value`]: left-pads the trimmed bytes back to
/// a full word.
pub(crate) fn decode_storage_value(encoded: &[u8]) -> Result<B256, StateError> {
    let bytes: Bytes = alloy_rlp::Decodable::decode(&mut &encoded[..]).map_err(|_| {
        StateError::Trie(ursa_trie::TrieError::InvalidNode {
            hash: B256::ZERO,
            reason: "malformed storage value",
        })
    })?;
    if bytes.len() > 32 {
        return Err(StateError::Trie(ursa_trie::TrieError::InvalidNode {
            hash: B256::ZERO,
            reason: "oversized storage value",
        }));
    }
    let mut value = B256::ZERO;
    value[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(value)
}

pub(crate) fn code_hash_of(code: &[u8]) -> B256 {
    if code.is_empty() {
        KECCAK_EMPTY
    } else {
        keccak256(code)
    }
}
