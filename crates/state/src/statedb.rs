use crate::{
    journal::{Journal, JournalEntry},
    object::{code_hash_of, StateObject},
    StateError,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::Decodable;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::debug;
use ursa_primitives::{Account, Log, EMPTY_ROOT_HASH, KECCAK_EMPTY};
use ursa_trie::{SecureTrie, TrieDb, TrieError};

/// A snapshot revision: the journal length at the moment the snapshot was
/// taken, under a caller-visible id.
#[derive(Clone, Copy, Debug)]
struct Revision {
    id: usize,
    journal_len: usize,
}

/// Journaled account state over an account trie.
///
/// Every mutation appends a reversible entry to a linear journal, so any
/// [`StateDb::snapshot`] can be restored exactly. Mutations stay in memory:
/// [`StateDb::intermediate_root`] produces the would-be trie root without
/// persisting and [`StateDb::commit`] stages all tries into the node cache
/// and flushes them to the backing store.
///
/// Not safe for concurrent mutation; [`StateDb::copy`] produces an isolated
/// instance sharing only the node cache underneath.
#[derive(Debug)]
pub struct StateDb {
    db: Arc<TrieDb>,
    trie: SecureTrie,

    objects: HashMap<Address, StateObject>,
    objects_dirty: HashSet<Address>,

    /// First database error recorded by an infallible accessor, surfaced at
    /// the next root computation.
    db_err: Option<TrieError>,

    refund: u64,

    tx_hash: B256,
    block_hash: B256,
    tx_index: u64,
    log_size: u64,
    logs: HashMap<B256, Vec<Log>>,

    preimages: HashMap<B256, Bytes>,

    journal: Journal,
    next_revision_id: usize,
    revisions: Vec<Revision>,
}

impl StateDb {
    /// Opens the state rooted at `root`.
    pub fn new(root: B256, db: Arc<TrieDb>) -> Result<Self, StateError> {
        let trie = SecureTrie::new(root, db.clone())?;
        Ok(Self {
            db,
            trie,
            objects: HashMap::new(),
            objects_dirty: HashSet::new(),
            db_err: None,
            refund: 0,
            tx_hash: B256::ZERO,
            block_hash: B256::ZERO,
            tx_index: 0,
            log_size: 0,
            logs: HashMap::new(),
            preimages: HashMap::new(),
            journal: Journal::default(),
            next_revision_id: 0,
            revisions: Vec::new(),
        })
    }

    /// The trie node cache backing this state.
    pub fn trie_db(&self) -> &Arc<TrieDb> {
        &self.db
    }

    fn set_error(&mut self, err: StateError) {
        if self.db_err.is_none() {
            debug!(target: "state", %err, "deferring state access error");
            if let StateError::Trie(err) = err {
                self.db_err = Some(err);
            }
        }
    }

    /// Loads the account into the object map if it exists; returns whether a
    /// live object is present afterwards.
    fn ensure_loaded(&mut self, address: Address) -> Result<bool, StateError> {
        if let Some(obj) = self.objects.get(&address) {
            return Ok(!obj.deleted);
        }
        let Some(encoded) = self.trie.get(address.as_slice())? else {
            return Ok(false);
        };
        let account = Account::decode(&mut encoded.as_ref()).map_err(|_| {
            StateError::Trie(TrieError::InvalidNode {
                hash: keccak256(address),
                reason: "malformed account record",
            })
        })?;
        self.objects.insert(address, StateObject::new(address, account));
        Ok(true)
    }

    /// Replaces any live object at `address` with a fresh one, journaling
    /// the change. Returns the balance of the replaced live object.
    fn create_object(&mut self, address: Address) -> Result<Option<U256>, StateError> {
        self.ensure_loaded(address)?;
        let prev = self.objects.remove(&address).filter(|obj| !obj.deleted);
        let prev_balance = prev.as_ref().map(StateObject::balance);
        match prev {
            Some(live) => {
                self.journal.append(JournalEntry::ResetObject { prev: Box::new(live) })
            }
            None => self.journal.append(JournalEntry::CreateObject { address }),
        }
        self.objects.insert(address, StateObject::new(address, Account::default()));
        Ok(prev_balance)
    }

    fn get_or_create(&mut self, address: Address) -> Result<(), StateError> {
        if self.ensure_loaded(address)? {
            return Ok(());
        }
        self.create_object(address)?;
        Ok(())
    }

    // === accessors =========================================================

    /// Whether the account exists. Suicided accounts still report as
    /// existing until finalisation removes them.
    pub fn exist(&mut self, address: Address) -> bool {
        match self.ensure_loaded(address) {
            Ok(live) => live,
            Err(err) => {
                self.set_error(err);
                false
            }
        }
    }

    /// Whether the account is absent or empty (no nonce, balance or code).
    pub fn empty(&mut self, address: Address) -> bool {
        match self.ensure_loaded(address) {
            Ok(true) => self.objects[&address].is_empty(),
            Ok(false) => true,
            Err(err) => {
                self.set_error(err);
                true
            }
        }
    }

    /// Spendable balance of the account; zero when absent.
    pub fn get_balance(&mut self, address: Address) -> U256 {
        self.read(address, U256::ZERO, |obj| obj.balance())
    }

    /// Locked balance of the account; zero when absent.
    pub fn get_locked_balance(&mut self, address: Address) -> U256 {
        self.read(address, U256::ZERO, |obj| obj.locked_balance())
    }

    /// Current nonce of the account; zero when absent.
    pub fn get_nonce(&mut self, address: Address) -> u64 {
        self.read(address, 0, |obj| obj.nonce())
    }

    /// Delegate timestamp of the account; zero when absent.
    pub fn get_delegate_timestamp(&mut self, address: Address) -> U256 {
        self.read(address, U256::ZERO, |obj| obj.delegate_timestamp())
    }

    /// Delegated-to addresses of the account.
    pub fn get_delegate_addresses(&mut self, address: Address) -> Vec<Address> {
        self.read(address, Vec::new(), |obj| obj.delegate_addresses().to_vec())
    }

    /// Code hash of the account; the empty-code hash when absent.
    pub fn get_code_hash(&mut self, address: Address) -> B256 {
        self.read(address, KECCAK_EMPTY, |obj| obj.code_hash())
    }

    /// Whether the account has been marked suicided.
    pub fn has_suicided(&mut self, address: Address) -> bool {
        self.read(address, false, |obj| obj.suicided)
    }

    /// Bytecode of the account; empty when absent.
    pub fn get_code(&mut self, address: Address) -> Bytes {
        match self.ensure_loaded(address) {
            Ok(true) => {
                let Self { objects, db, .. } = &mut *self;
                let obj = objects.get_mut(&address).expect("loaded");
                match obj.code(db) {
                    Ok(code) => code,
                    Err(err) => {
                        self.set_error(err);
                        Bytes::new()
                    }
                }
            }
            Ok(false) => Bytes::new(),
            Err(err) => {
                self.set_error(err);
                Bytes::new()
            }
        }
    }

    /// Size of the account bytecode in bytes.
    pub fn get_code_size(&mut self, address: Address) -> usize {
        self.get_code(address).len()
    }

    /// Reads a storage slot of the account; zero when absent.
    pub fn get_state(&mut self, address: Address, key: B256) -> B256 {
        match self.ensure_loaded(address) {
            Ok(true) => {
                let Self { objects, db, .. } = &mut *self;
                let obj = objects.get_mut(&address).expect("loaded");
                match obj.storage(db, key) {
                    Ok(value) => value,
                    Err(err) => {
                        self.set_error(err);
                        B256::ZERO
                    }
                }
            }
            Ok(false) => B256::ZERO,
            Err(err) => {
                self.set_error(err);
                B256::ZERO
            }
        }
    }

    /// Accumulated gas refund.
    pub fn get_refund(&self) -> u64 {
        self.refund
    }

    /// Logs recorded under `tx_hash`.
    pub fn get_logs(&self, tx_hash: B256) -> Vec<Log> {
        self.logs.get(&tx_hash).cloned().unwrap_or_default()
    }

    /// All recorded logs, ordered by their position in the block.
    pub fn logs(&self) -> Vec<Log> {
        let mut logs: Vec<Log> = self.logs.values().flatten().cloned().collect();
        logs.sort_by_key(|log| log.log_index);
        logs
    }

    fn read<R>(
        &mut self,
        address: Address,
        default: R,
        f: impl FnOnce(&StateObject) -> R,
    ) -> R {
        match self.ensure_loaded(address) {
            Ok(true) => f(&self.objects[&address]),
            Ok(false) => default,
            Err(err) => {
                self.set_error(err);
                default
            }
        }
    }

    /// Visits every storage slot of the account: staged writes and cached
    /// reads first, then the remaining persisted slots.
    pub fn for_each_storage(
        &mut self,
        address: Address,
        f: &mut dyn FnMut(B256, B256) -> bool,
    ) -> Result<(), StateError> {
        if !self.ensure_loaded(address)? {
            return Ok(());
        }
        let Self { objects, db, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("loaded");

        let mut seen: HashSet<B256> = HashSet::new();
        for (key, value) in obj.dirty_storage.clone() {
            if seen.insert(key) && !f(key, value) {
                return Ok(());
            }
        }
        for (key, value) in obj.cached_storage.clone() {
            if seen.insert(key) && !f(key, value) {
                return Ok(());
            }
        }

        let mut walk_err = None;
        let trie = obj.storage_trie(db)?;
        trie.for_each(&mut |hashed, encoded| {
            let key = match db.preimage(hashed) {
                Ok(Some(preimage)) if preimage.len() == 32 => B256::from_slice(&preimage),
                Ok(_) => return,
                Err(err) => {
                    walk_err.get_or_insert(err);
                    return;
                }
            };
            if !seen.insert(key) {
                return;
            }
            if let Ok(value) = crate::object::decode_storage_value(encoded) {
                f(key, value);
            }
        })?;
        match walk_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    // === journaled mutations ==============================================

    /// Explicitly (re)creates the account. A pre-existing balance is carried
    /// over into the fresh account.
    pub fn create_account(&mut self, address: Address) -> Result<(), StateError> {
        let prev_balance = self.create_object(address)?;
        if let Some(balance) = prev_balance {
            self.objects.get_mut(&address).expect("just created").set_balance(balance);
        }
        Ok(())
    }

    /// Adds `amount` to the account balance. A zero-amount add still touches
    /// the account so empty-account deletion observes it.
    pub fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        if amount.is_zero() {
            if obj.is_empty() {
                let prev_touched = obj.touched;
                obj.touched = true;
                journal.append(JournalEntry::TouchChange { address, prev_touched });
            }
            return Ok(());
        }
        let prev = obj.balance();
        let new =
            prev.checked_add(amount).ok_or(StateError::BalanceOverflow { address })?;
        journal.append(JournalEntry::BalanceChange { address, prev });
        obj.set_balance(new);
        Ok(())
    }

    /// Subtracts `amount` from the account balance.
    pub fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        if amount.is_zero() {
            return self.add_balance(address, amount);
        }
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        let prev = obj.balance();
        let new =
            prev.checked_sub(amount).ok_or(StateError::BalanceUnderflow { address })?;
        journal.append(JournalEntry::BalanceChange { address, prev });
        obj.set_balance(new);
        Ok(())
    }

    /// Sets the account balance outright.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        journal.append(JournalEntry::BalanceChange { address, prev: obj.balance() });
        obj.set_balance(balance);
        Ok(())
    }

    /// Sets the locked balance outright.
    pub fn set_locked_balance(
        &mut self,
        address: Address,
        locked: U256,
    ) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        journal
            .append(JournalEntry::LockedBalanceChange { address, prev: obj.locked_balance() });
        obj.set_locked_balance(locked);
        Ok(())
    }

    /// Adds `amount` to the locked balance.
    pub fn lock_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        let prev = obj.locked_balance();
        let new =
            prev.checked_add(amount).ok_or(StateError::BalanceOverflow { address })?;
        journal.append(JournalEntry::LockedBalanceChange { address, prev });
        obj.set_locked_balance(new);
        Ok(())
    }

    /// Releases the locked balance back to zero.
    pub fn unlock_balance(&mut self, address: Address) -> Result<(), StateError> {
        self.set_locked_balance(address, U256::ZERO)
    }

    /// Sets the account nonce.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        journal.append(JournalEntry::NonceChange { address, prev: obj.nonce() });
        obj.set_nonce(nonce);
        Ok(())
    }

    /// Sets the delegate timestamp.
    pub fn set_delegate_timestamp(
        &mut self,
        address: Address,
        timestamp: U256,
    ) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        journal.append(JournalEntry::DelegateTimestampChange {
            address,
            prev: obj.delegate_timestamp(),
        });
        obj.set_delegate_timestamp(timestamp);
        Ok(())
    }

    /// Re-stamps the delegate timestamp at undelegation time, starting the
    /// redemption clock.
    pub fn reset_delegate_timestamp(
        &mut self,
        address: Address,
        now: U256,
    ) -> Result<(), StateError> {
        self.set_delegate_timestamp(address, now)
    }

    /// Sets the delegated-to address list.
    pub fn set_delegate_addresses(
        &mut self,
        address: Address,
        addresses: Vec<Address>,
    ) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        journal.append(JournalEntry::DelegateAddressesChange {
            address,
            prev: obj.delegate_addresses().to_vec(),
        });
        obj.set_delegate_addresses(addresses);
        Ok(())
    }

    /// Sets the account code, hashing it.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, db, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        let prev_hash = obj.code_hash();
        let prev_code = match obj.code(db) {
            Ok(code) => code,
            // The previous code may be unresolvable (e.g. pruned); revert
            // would restore the hash only.
            Err(_) => Bytes::new(),
        };
        journal.append(JournalEntry::CodeChange { address, prev_hash, prev_code });
        obj.set_code(code_hash_of(&code), code);
        Ok(())
    }

    /// Writes a storage slot.
    pub fn set_state(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
    ) -> Result<(), StateError> {
        self.get_or_create(address)?;
        let Self { objects, journal, db, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("ensured");
        let prev = obj.storage(db, key)?;
        journal.append(JournalEntry::StorageChange { address, key, prev });
        obj.set_storage(key, value);
        Ok(())
    }

    /// Marks the account suicided and zeroes its balance. Returns whether an
    /// account existed to mark.
    pub fn suicide(&mut self, address: Address) -> Result<bool, StateError> {
        if !self.ensure_loaded(address)? {
            return Ok(false);
        }
        let Self { objects, journal, .. } = &mut *self;
        let obj = objects.get_mut(&address).expect("loaded");
        journal.append(JournalEntry::SuicideChange {
            address,
            prev_suicided: obj.suicided,
            prev_balance: obj.balance(),
        });
        obj.mark_suicided();
        obj.set_balance(U256::ZERO);
        Ok(true)
    }

    /// Adds to the gas refund counter.
    pub fn add_refund(&mut self, amount: u64) {
        self.journal.append(JournalEntry::RefundChange { prev: self.refund });
        self.refund = self.refund.saturating_add(amount);
    }

    /// Positions subsequent logs: they are attributed to `tx_hash` inside
    /// `block_hash` at transaction `index`.
    pub fn prepare(&mut self, tx_hash: B256, block_hash: B256, index: u64) {
        self.tx_hash = tx_hash;
        self.block_hash = block_hash;
        self.tx_index = index;
    }

    /// Records a log against the prepared transaction position.
    pub fn add_log(&mut self, mut log: Log) {
        self.journal.append(JournalEntry::LogChange { tx_hash: self.tx_hash });
        log.transaction_hash = self.tx_hash;
        log.block_hash = self.block_hash;
        log.transaction_index = self.tx_index;
        log.log_index = self.log_size;
        self.logs.entry(self.tx_hash).or_default().push(log);
        self.log_size += 1;
    }

    /// Records a keccak preimage observed during execution.
    pub fn add_preimage(&mut self, hash: B256, preimage: Bytes) {
        if self.preimages.contains_key(&hash) {
            return;
        }
        self.journal.append(JournalEntry::PreimageChange { hash });
        self.preimages.insert(hash, preimage);
    }

    // === snapshots ========================================================

    /// Takes a snapshot of the current state, returning its id.
    pub fn snapshot(&mut self) -> usize {
        let id = self.next_revision_id;
        self.next_revision_id += 1;
        self.revisions.push(Revision { id, journal_len: self.journal.len() });
        id
    }

    /// Rolls all mutations made since snapshot `id` back, invalidating `id`
    /// and every snapshot taken after it.
    pub fn revert_to_snapshot(&mut self, id: usize) -> Result<(), StateError> {
        let idx = self
            .revisions
            .iter()
            .position(|revision| revision.id == id)
            .ok_or(StateError::UnknownRevision { id })?;
        let journal_len = self.revisions[idx].journal_len;

        let tail = self.journal.entries.split_off(journal_len);
        for entry in tail.into_iter().rev() {
            if let Some(address) = entry.address() {
                self.journal.undirty(address);
            }
            self.undo(entry);
        }
        self.revisions.truncate(idx);
        Ok(())
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::CreateObject { address } => {
                self.objects.remove(&address);
            }
            JournalEntry::ResetObject { prev } => {
                self.objects.insert(prev.address(), *prev);
            }
            JournalEntry::SuicideChange { address, prev_suicided, prev_balance } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.suicided = prev_suicided;
                    obj.set_balance(prev_balance);
                }
            }
            JournalEntry::TouchChange { address, prev_touched } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.touched = prev_touched;
                }
            }
            JournalEntry::BalanceChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_balance(prev);
                }
            }
            JournalEntry::LockedBalanceChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_locked_balance(prev);
                }
            }
            JournalEntry::NonceChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_nonce(prev);
                }
            }
            JournalEntry::StorageChange { address, key, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_storage(key, prev);
                }
            }
            JournalEntry::CodeChange { address, prev_hash, prev_code } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_code(prev_hash, prev_code);
                }
            }
            JournalEntry::RefundChange { prev } => self.refund = prev,
            JournalEntry::LogChange { tx_hash } => {
                if let Some(logs) = self.logs.get_mut(&tx_hash) {
                    logs.pop();
                    if logs.is_empty() {
                        self.logs.remove(&tx_hash);
                    }
                }
                self.log_size = self.log_size.saturating_sub(1);
            }
            JournalEntry::PreimageChange { hash } => {
                self.preimages.remove(&hash);
            }
            JournalEntry::DelegateTimestampChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_delegate_timestamp(prev);
                }
            }
            JournalEntry::DelegateAddressesChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_delegate_addresses(prev);
                }
            }
        }
    }

    /// Number of accounts dirtied by the open journal window. Test support.
    pub fn journal_dirty_count(&self) -> usize {
        self.journal.dirties.len()
    }

    // === finalisation =====================================================

    /// Settles the open journal window: suicided (and, when `delete_empty`,
    /// empty) touched accounts are removed from the trie; every other dirty
    /// account has its staged storage flushed into its storage trie. Clears
    /// the journal and all snapshots. Logs and the refund counter persist.
    pub fn finalise(&mut self, delete_empty: bool) -> Result<(), StateError> {
        let mut addresses: Vec<Address> = self.journal.dirties.keys().copied().collect();
        addresses.sort_unstable();
        for address in addresses {
            let Self { objects, trie, db, objects_dirty, .. } = &mut *self;
            let Some(obj) = objects.get_mut(&address) else { continue };
            if obj.suicided || (delete_empty && obj.is_empty()) {
                obj.deleted = true;
                trie.remove(address.as_slice())?;
            } else {
                obj.update_root(db)?;
            }
            objects_dirty.insert(address);
        }
        self.journal.clear();
        self.revisions.clear();
        Ok(())
    }

    /// Finalises, writes every dirty account record into the account trie
    /// and returns the resulting root without persisting anything.
    pub fn intermediate_root(&mut self, delete_empty: bool) -> Result<B256, StateError> {
        if let Some(err) = self.db_err.take() {
            return Err(err.into());
        }
        self.finalise(delete_empty)?;
        let Self { objects, objects_dirty, trie, .. } = &mut *self;
        for address in objects_dirty.iter() {
            let Some(obj) = objects.get(address) else { continue };
            if !obj.deleted {
                trie.insert(address.as_slice(), &obj.encoded_account())?;
            }
        }
        Ok(trie.hash())
    }

    /// Commits the state: finalises, stages code, storage tries and the
    /// account trie into the node cache, pins the new root and flushes it to
    /// the persistent store. Returns the committed root.
    pub fn commit(&mut self, delete_empty: bool) -> Result<B256, StateError> {
        if let Some(err) = self.db_err.take() {
            return Err(err.into());
        }
        self.finalise(delete_empty)?;

        let mut addresses: Vec<Address> = self.objects_dirty.iter().copied().collect();
        addresses.sort_unstable();
        for address in addresses {
            let Self { objects, trie, db, .. } = &mut *self;
            let Some(obj) = objects.get_mut(&address) else { continue };
            if obj.deleted {
                continue;
            }
            if obj.dirty_code {
                if let Some(code) = obj.cached_code() {
                    db.insert(obj.code_hash(), code);
                }
                obj.dirty_code = false;
            }
            obj.commit_trie(db)?;
            trie.insert(address.as_slice(), &obj.encoded_account())?;
        }

        for (hash, preimage) in &self.preimages {
            self.db.insert_preimage(*hash, preimage);
        }

        // Commit the account trie, wiring each account's storage root and
        // code into the reference graph of the node holding the account.
        let db = self.db.clone();
        let mut leaf_err: Option<TrieError> = None;
        let root = {
            let mut on_leaf = |value: &[u8], parent: B256| {
                let Ok(account) = Account::decode(&mut &value[..]) else { return };
                if account.storage_root != EMPTY_ROOT_HASH {
                    if let Err(err) = db.reference(account.storage_root, parent) {
                        leaf_err.get_or_insert(err);
                    }
                }
                if account.code_hash != KECCAK_EMPTY {
                    if let Err(err) = db.reference(account.code_hash, parent) {
                        leaf_err.get_or_insert(err);
                    }
                }
            };
            self.trie.commit(Some(&mut on_leaf))?
        };
        if let Some(err) = leaf_err {
            return Err(err.into());
        }

        self.db.reference(root, B256::ZERO)?;
        self.db.commit(root, false)?;
        self.objects_dirty.clear();
        debug!(target: "state", %root, "committed state");
        Ok(root)
    }

    /// Discards all in-memory state and rebinds to the trie at `root`.
    pub fn reset(&mut self, root: B256) -> Result<(), StateError> {
        self.trie = SecureTrie::new(root, self.db.clone())?;
        self.objects.clear();
        self.objects_dirty.clear();
        self.db_err = None;
        self.refund = 0;
        self.tx_hash = B256::ZERO;
        self.block_hash = B256::ZERO;
        self.tx_index = 0;
        self.log_size = 0;
        self.logs.clear();
        self.preimages.clear();
        self.journal.clear();
        self.revisions.clear();
        Ok(())
    }

    /// An independent copy sharing only the trie node cache underneath:
    /// objects, logs, refund and dirty tracking are deep-copied, the journal
    /// starts empty.
    pub fn copy(&self) -> Self {
        Self {
            db: self.db.clone(),
            trie: self.trie.clone(),
            objects: self.objects.clone(),
            objects_dirty: self.objects_dirty.clone(),
            db_err: None,
            refund: self.refund,
            tx_hash: self.tx_hash,
            block_hash: self.block_hash,
            tx_index: self.tx_index,
            log_size: self.log_size,
            logs: self.logs.clone(),
            preimages: self.preimages.clone(),
            journal: Journal::default(),
            next_revision_id: 0,
            revisions: Vec::new(),
        }
    }

    pub(crate) fn account_trie(&self) -> &SecureTrie {
        &self.trie
    }
}
