use crate::{trie::LeafCallback, Trie, TrieDb, TrieError};
use alloy_primitives::{keccak256, Bytes, B256};
use std::{collections::HashMap, sync::Arc};

/// A trie whose keys are hashed with keccak-256 before insertion.
///
/// Hashing keys bounds node depth regardless of caller-chosen keys; the
/// original key bytes are buffered per handle and recorded as preimages in
/// the [`TrieDb`] when the trie is committed, so state dumps and iteration
/// can present them again. Removing a key before the commit also drops its
/// buffered preimage.
#[derive(Clone, Debug)]
pub struct SecureTrie {
    trie: Trie,
    sec_key_cache: HashMap<B256, Vec<u8>>,
}

impl SecureTrie {
    /// Opens the secure trie rooted at `root`.
    pub fn new(root: B256, db: Arc<TrieDb>) -> Result<Self, TrieError> {
        Ok(Self { trie: Trie::new(root, db)?, sec_key_cache: HashMap::new() })
    }

    /// An empty secure trie over `db`.
    pub fn empty(db: Arc<TrieDb>) -> Self {
        Self {
            trie: Trie::new(ursa_primitives::EMPTY_ROOT_HASH, db)
                .expect("empty root always resolves"),
            sec_key_cache: HashMap::new(),
        }
    }

    /// The node cache this trie resolves through.
    pub fn db(&self) -> &Arc<TrieDb> {
        self.trie.db()
    }

    /// Looks up the value stored under `key`.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>, TrieError> {
        self.trie.get(keccak256(key).as_slice())
    }

    /// Inserts `key -> value`, buffering the key preimage.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        let hashed = keccak256(key);
        self.sec_key_cache.insert(hashed, key.to_vec());
        self.trie.insert(hashed.as_slice(), value)
    }

    /// Removes `key` if present, dropping its buffered preimage.
    pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let hashed = keccak256(key);
        self.sec_key_cache.remove(&hashed);
        self.trie.remove(hashed.as_slice())
    }

    /// The root hash of the current content, without touching the cache.
    pub fn hash(&self) -> B256 {
        self.trie.hash()
    }

    /// Stages the trie into the node cache, flushing the buffered preimages
    /// alongside, and returns the new root.
    pub fn commit(&mut self, on_leaf: Option<LeafCallback<'_>>) -> Result<B256, TrieError> {
        for (hashed, key) in self.sec_key_cache.drain() {
            self.trie.db().insert_preimage(hashed, &key);
        }
        self.trie.commit(on_leaf)
    }

    /// Walks every leaf, invoking `f` with the hashed key and stored value.
    pub fn for_each(
        &self,
        f: &mut dyn FnMut(B256, &[u8]),
    ) -> Result<(), TrieError> {
        self.trie.for_each_leaf(&mut |key, value| f(B256::from_slice(key), value))
    }
}
