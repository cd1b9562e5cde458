use crate::{StateDb, StateError};
use alloy_primitives::{hex, Address, B256};
use alloy_rlp::Decodable;
use serde::Serialize;
use std::collections::BTreeMap;
use ursa_primitives::{Account, KECCAK_EMPTY};
use ursa_trie::SecureTrie;

/// One account as presented by [`StateDb::dump`].
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DumpAccount {
    /// Spendable balance, decimal.
    pub balance: String,
    /// Locked balance, decimal.
    pub locked_balance: String,
    /// Delegate timestamp, decimal.
    pub delegate_timestamp: String,
    /// Account nonce.
    pub nonce: u64,
    /// Storage trie root, hex.
    pub root: String,
    /// Code hash, hex.
    pub code_hash: String,
    /// Bytecode, hex.
    pub code: String,
    /// Storage slots, hex key to hex value.
    pub storage: BTreeMap<String, String>,
}

/// A full state dump keyed by preimage-recovered addresses.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Dump {
    /// Account trie root, hex.
    pub root: String,
    /// Dumped accounts, hex address to record.
    pub accounts: BTreeMap<String, DumpAccount>,
}

impl Dump {
    /// Pretty-printed JSON rendering of the dump.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("dump serialization cannot fail")
    }
}

impl StateDb {
    /// Dumps every account reachable from the current account trie.
    ///
    /// Addresses and storage keys are recovered through the preimage store,
    /// so only committed (or staged) tries with recorded preimages dump
    /// completely; unrecoverable keys are skipped.
    pub fn dump(&mut self) -> Result<Dump, StateError> {
        let root = self.account_trie().hash();

        let mut raw: Vec<(B256, Vec<u8>)> = Vec::new();
        self.account_trie()
            .for_each(&mut |hashed, encoded| raw.push((hashed, encoded.to_vec())))?;

        let db = self.trie_db().clone();
        let mut accounts = BTreeMap::new();
        for (hashed, encoded) in raw {
            let Some(preimage) = db.preimage(hashed)? else { continue };
            if preimage.len() != Address::len_bytes() {
                continue;
            }
            let address = Address::from_slice(&preimage);
            let account = Account::decode(&mut encoded.as_slice()).map_err(|_| {
                StateError::Trie(ursa_trie::TrieError::InvalidNode {
                    hash: hashed,
                    reason: "malformed account record",
                })
            })?;

            let code = if account.code_hash == KECCAK_EMPTY {
                Vec::new()
            } else {
                db.node(account.code_hash)?.map(|code| code.to_vec()).unwrap_or_default()
            };

            let mut storage = BTreeMap::new();
            let storage_trie = SecureTrie::new(account.storage_root, db.clone())?;
            let mut raw_slots: Vec<(B256, Vec<u8>)> = Vec::new();
            storage_trie
                .for_each(&mut |hashed, encoded| raw_slots.push((hashed, encoded.to_vec())))?;
            for (hashed_slot, encoded_value) in raw_slots {
                let Some(slot_preimage) = db.preimage(hashed_slot)? else { continue };
                let value = crate::object::decode_storage_value(&encoded_value)?;
                storage.insert(hex::encode(&slot_preimage), hex::encode(value));
            }

            accounts.insert(
                hex::encode(address),
                DumpAccount {
                    balance: account.balance.to_string(),
                    locked_balance: account.locked_balance.to_string(),
                    delegate_timestamp: account.delegate_timestamp.to_string(),
                    nonce: account.nonce,
                    root: hex::encode(account.storage_root),
                    code_hash: hex::encode(account.code_hash),
                    code: hex::encode(&code),
                    storage,
                },
            );
        }

        Ok(Dump { root: hex::encode(root), accounts })
    }
}
