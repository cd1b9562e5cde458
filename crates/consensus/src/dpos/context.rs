use alloy_primitives::{Address, B256};
use alloy_rlp::{Decodable, Encodable};
use std::sync::Arc;
use ursa_primitives::DposContextProto;
use ursa_trie::{SecureTrie, TrieDb, TrieError};

/// Reserved candidate-trie key carrying the active validator list.
const VALIDATORS_KEY: &[u8] = b"validators";

/// The DPoS bookkeeping tries attached to every block: candidates (with the
/// active validator list), delegations, votes and per-validator mint
/// counts.
///
/// Handles are copy-on-write like the tries underneath; a context opened
/// from a proto can be mutated freely and only materializes new roots on
/// [`DposContext::commit`].
#[derive(Clone, Debug)]
pub struct DposContext {
    candidate_trie: SecureTrie,
    delegate_trie: SecureTrie,
    vote_trie: SecureTrie,
    mint_cnt_trie: SecureTrie,
}

impl DposContext {
    /// A fresh, empty context.
    pub fn new(db: Arc<TrieDb>) -> Self {
        Self {
            candidate_trie: SecureTrie::empty(db.clone()),
            delegate_trie: SecureTrie::empty(db.clone()),
            vote_trie: SecureTrie::empty(db.clone()),
            mint_cnt_trie: SecureTrie::empty(db),
        }
    }

    /// Opens the context committed under `proto`.
    pub fn from_proto(db: Arc<TrieDb>, proto: &DposContextProto) -> Result<Self, TrieError> {
        Ok(Self {
            candidate_trie: SecureTrie::new(proto.candidate_root, db.clone())?,
            delegate_trie: SecureTrie::new(proto.delegate_root, db.clone())?,
            vote_trie: SecureTrie::new(proto.vote_root, db.clone())?,
            mint_cnt_trie: SecureTrie::new(proto.mint_cnt_root, db)?,
        })
    }

    /// Registers `candidate`.
    pub fn become_candidate(&mut self, candidate: Address) -> Result<(), TrieError> {
        self.candidate_trie.insert(candidate.as_slice(), candidate.as_slice())
    }

    /// Removes `candidate` and its accumulated votes.
    pub fn kickout_candidate(&mut self, candidate: Address) -> Result<(), TrieError> {
        self.candidate_trie.remove(candidate.as_slice())?;
        self.vote_trie.remove(candidate.as_slice())
    }

    /// Whether `candidate` is registered.
    pub fn is_candidate(&mut self, candidate: Address) -> Result<bool, TrieError> {
        Ok(self.candidate_trie.get(candidate.as_slice())?.is_some())
    }

    /// Records `delegator`'s votes for `candidates`: the delegation list and
    /// one vote edge per candidate.
    pub fn delegate(
        &mut self,
        delegator: Address,
        candidates: &[Address],
    ) -> Result<(), TrieError> {
        let mut encoded = Vec::new();
        candidates.to_vec().encode(&mut encoded);
        self.delegate_trie.insert(delegator.as_slice(), &encoded)?;
        for candidate in candidates {
            self.vote_trie.insert(&vote_key(*candidate, delegator), delegator.as_slice())?;
        }
        Ok(())
    }

    /// Removes `delegator`'s delegation and its vote edges.
    pub fn undelegate(
        &mut self,
        delegator: Address,
        candidates: &[Address],
    ) -> Result<(), TrieError> {
        self.delegate_trie.remove(delegator.as_slice())?;
        for candidate in candidates {
            self.vote_trie.remove(&vote_key(*candidate, delegator))?;
        }
        Ok(())
    }

    /// The candidates `delegator` currently votes for.
    pub fn delegation(&mut self, delegator: Address) -> Result<Vec<Address>, TrieError> {
        let Some(encoded) = self.delegate_trie.get(delegator.as_slice())? else {
            return Ok(Vec::new());
        };
        Vec::<Address>::decode(&mut encoded.as_ref()).map_err(|_| TrieError::InvalidNode {
            hash: B256::ZERO,
            reason: "malformed delegation list",
        })
    }

    /// Bumps the mint counter of `validator`.
    pub fn update_mint_cnt(&mut self, validator: Address) -> Result<(), TrieError> {
        let count = self.mint_cnt(validator)? + 1;
        let mut encoded = Vec::new();
        count.encode(&mut encoded);
        self.mint_cnt_trie.insert(validator.as_slice(), &encoded)
    }

    /// Blocks minted by `validator` so far.
    pub fn mint_cnt(&mut self, validator: Address) -> Result<u64, TrieError> {
        let Some(encoded) = self.mint_cnt_trie.get(validator.as_slice())? else {
            return Ok(0);
        };
        u64::decode(&mut encoded.as_ref()).map_err(|_| TrieError::InvalidNode {
            hash: B256::ZERO,
            reason: "malformed mint count",
        })
    }

    /// The active validator list.
    pub fn validators(&mut self) -> Result<Vec<Address>, TrieError> {
        let Some(encoded) = self.candidate_trie.get(VALIDATORS_KEY)? else {
            return Ok(Vec::new());
        };
        Vec::<Address>::decode(&mut encoded.as_ref()).map_err(|_| TrieError::InvalidNode {
            hash: B256::ZERO,
            reason: "malformed validator list",
        })
    }

    /// Replaces the active validator list.
    pub fn set_validators(&mut self, validators: &[Address]) -> Result<(), TrieError> {
        let mut encoded = Vec::new();
        validators.to_vec().encode(&mut encoded);
        self.candidate_trie.insert(VALIDATORS_KEY, &encoded)
    }

    /// Commits all four tries into the node cache and returns their roots.
    pub fn commit(&mut self) -> Result<DposContextProto, TrieError> {
        Ok(DposContextProto {
            candidate_root: self.candidate_trie.commit(None)?,
            delegate_root: self.delegate_trie.commit(None)?,
            vote_root: self.vote_trie.commit(None)?,
            mint_cnt_root: self.mint_cnt_trie.commit(None)?,
        })
    }

    /// The would-be roots of the current content, without staging anything.
    pub fn proto(&self) -> DposContextProto {
        DposContextProto {
            candidate_root: self.candidate_trie.hash(),
            delegate_root: self.delegate_trie.hash(),
            vote_root: self.vote_trie.hash(),
            mint_cnt_root: self.mint_cnt_trie.hash(),
        }
    }
}

fn vote_key(candidate: Address, delegator: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(candidate.as_slice());
    key.extend_from_slice(delegator.as_slice());
    key
}
