use crate::TrieError;
use alloy_primitives::{Bytes, B256};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;
use ursa_db::{Batch, KeyValueStore, IDEAL_BATCH_SIZE};
use ursa_primitives::StorageSize;

/// Database key prefix under which trie node preimages are stored.
const SECURE_KEY_PREFIX: &[u8; 11] = b"secure-key-";

/// Length of a preimage key: prefix plus a 32-byte hash.
const SECURE_KEY_LENGTH: usize = 11 + 32;

/// One cached trie node: its encoding and the reference edges that keep it
/// alive.
struct CachedNode {
    /// Raw node encoding. Immutable once inserted.
    blob: Bytes,
    /// Number of live parents referencing this node.
    parents: u32,
    /// References this node holds into other cached nodes.
    children: HashMap<B256, u32>,
}

#[derive(Default)]
struct TrieDbInner {
    nodes: HashMap<B256, CachedNode>,
    preimages: HashMap<B256, Bytes>,

    nodes_size: StorageSize,
    preimages_size: StorageSize,

    gc_nodes: u64,
    gc_size: StorageSize,
    gc_time: Duration,
}

/// The intermediate write layer between the trie structures and the disk
/// database: trie writes accumulate in memory and whole sub-DAGs are flushed
/// to disk on demand, garbage collecting the remainder.
///
/// The all-zero hash holds the root sentinel whose children are the
/// currently pinned top-level tries; pinning and unpinning go through
/// [`TrieDb::reference`] / [`TrieDb::dereference`] against [`B256::ZERO`].
pub struct TrieDb {
    disk: Arc<dyn KeyValueStore>,
    inner: RwLock<TrieDbInner>,
}

impl fmt::Debug for TrieDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TrieDb")
            .field("nodes", &inner.nodes.len())
            .field("preimages", &inner.preimages.len())
            .field("size", &(inner.nodes_size.as_u64() + inner.preimages_size.as_u64()))
            .finish()
    }
}

impl TrieDb {
    /// Creates a trie database in front of `disk`.
    pub fn new(disk: Arc<dyn KeyValueStore>) -> Self {
        let mut nodes = HashMap::new();
        // The root sentinel. Not inserted through `insert` so it never
        // participates in size accounting.
        nodes.insert(
            B256::ZERO,
            CachedNode { blob: Bytes::new(), parents: 0, children: HashMap::new() },
        );
        Self { disk, inner: RwLock::new(TrieDbInner { nodes, ..Default::default() }) }
    }

    /// The persistent store backing this cache.
    pub fn disk(&self) -> &Arc<dyn KeyValueStore> {
        &self.disk
    }

    /// Writes a new trie node to the cache if it is not yet known. The blob
    /// is copied.
    pub fn insert(&self, hash: B256, blob: &[u8]) {
        let mut inner = self.inner.write();
        inner.insert(hash, blob);
    }

    /// Records a key preimage if it is not yet known. The bytes are copied.
    pub fn insert_preimage(&self, hash: B256, preimage: &[u8]) {
        let mut inner = self.inner.write();
        if inner.preimages.contains_key(&hash) {
            return;
        }
        inner.preimages.insert(hash, Bytes::copy_from_slice(preimage));
        inner.preimages_size += (B256::len_bytes() + preimage.len()) as u64;
    }

    /// Retrieves a trie node, consulting the cache first and the persistent
    /// store second.
    pub fn node(&self, hash: B256) -> Result<Option<Bytes>, TrieError> {
        if let Some(node) = self.inner.read().nodes.get(&hash) {
            return Ok(Some(node.blob.clone()));
        }
        Ok(self.disk.get(hash.as_slice())?)
    }

    /// Retrieves a key preimage, consulting the cache first and the
    /// persistent store second.
    pub fn preimage(&self, hash: B256) -> Result<Option<Bytes>, TrieError> {
        if let Some(preimage) = self.inner.read().preimages.get(&hash) {
            return Ok(Some(preimage.clone()));
        }
        Ok(self.disk.get(&secure_key(hash))?)
    }

    /// Hashes of all cached nodes, excluding the root sentinel.
    ///
    /// Expensive; used to validate internal state in tests.
    pub fn nodes(&self) -> Vec<B256> {
        let inner = self.inner.read();
        inner.nodes.keys().copied().filter(|hash| !hash.is_zero()).collect()
    }

    /// Whether `hash` is currently held in the cache.
    pub fn contains(&self, hash: B256) -> bool {
        self.inner.read().nodes.contains_key(&hash)
    }

    /// Adds a reference edge from `parent` to `child`.
    ///
    /// A child that is not cached is already persisted and needs no
    /// bookkeeping. Duplicate edges are counted only for the root sentinel,
    /// whose pins are reference counted; ordinary edges deduplicate.
    pub fn reference(&self, child: B256, parent: B256) -> Result<(), TrieError> {
        let mut inner = self.inner.write();
        inner.reference(child, parent)
    }

    /// Removes the reference edge from `parent` to `child`, cascading the
    /// removal of any node whose parent count drops to zero.
    pub fn dereference(&self, child: B256, parent: B256) -> Result<(), TrieError> {
        let mut inner = self.inner.write();
        let (nodes, size, start) = (inner.nodes.len(), inner.nodes_size, Instant::now());
        inner.dereference(child, parent)?;

        let reclaimed_nodes = (nodes - inner.nodes.len()) as u64;
        let reclaimed_size = size.as_u64() - inner.nodes_size.as_u64();
        inner.gc_nodes += reclaimed_nodes;
        inner.gc_size += reclaimed_size;
        inner.gc_time += start.elapsed();

        metrics::counter!("trie.gc_nodes").increment(reclaimed_nodes);
        metrics::counter!("trie.gc_bytes").increment(reclaimed_size);
        debug!(
            target: "trie::db",
            nodes = reclaimed_nodes,
            size = %StorageSize(reclaimed_size),
            elapsed = ?start.elapsed(),
            live_nodes = inner.nodes.len(),
            live_size = %inner.nodes_size,
            "Dereferenced trie from memory database"
        );
        Ok(())
    }

    /// Flushes the sub-DAG rooted at `root`, and all accumulated preimages,
    /// to the persistent store, then drops the flushed data from the cache.
    ///
    /// Two phases: while holding the read lock the nodes are streamed into
    /// write batches, so concurrent readers keep resolving them and no
    /// concurrent dereference can drop a node mid-write; only once the final
    /// batch write has succeeded is the write lock taken to uncache the
    /// committed sub-DAG and clear the preimages. A failed batch write
    /// leaves the cache exactly as it was.
    pub fn commit(&self, root: B256, report: bool) -> Result<(), TrieError> {
        let start = Instant::now();
        let (flushed_nodes, flushed_size) = {
            let inner = self.inner.read();
            let mut batch = self.disk.batch();

            for (hash, preimage) in &inner.preimages {
                batch.put(&secure_key(*hash), preimage)?;
                if batch.value_size() > IDEAL_BATCH_SIZE {
                    batch.write()?;
                    batch.reset();
                }
            }

            let before = (
                inner.nodes.len(),
                StorageSize(inner.nodes_size.as_u64() + inner.preimages_size.as_u64()),
            );
            inner.commit_node(root, &mut *batch)?;
            batch.write()?;
            before
        };

        let mut inner = self.inner.write();
        inner.preimages.clear();
        inner.preimages_size = StorageSize(0);
        inner.uncache(root);

        let persisted = (flushed_nodes - inner.nodes.len()) as u64;
        metrics::counter!("trie.persisted_nodes").increment(persisted);
        let size = StorageSize(flushed_size.as_u64() - inner.nodes_size.as_u64());
        if report {
            tracing::info!(
                target: "trie::db",
                nodes = persisted,
                %size,
                elapsed = ?start.elapsed(),
                gc_nodes = inner.gc_nodes,
                gc_size = %inner.gc_size,
                gc_time = ?inner.gc_time,
                live_nodes = inner.nodes.len(),
                live_size = %inner.nodes_size,
                "Persisted trie from memory database"
            );
        } else {
            debug!(
                target: "trie::db",
                nodes = persisted,
                %size,
                elapsed = ?start.elapsed(),
                gc_nodes = inner.gc_nodes,
                gc_size = %inner.gc_size,
                gc_time = ?inner.gc_time,
                live_nodes = inner.nodes.len(),
                live_size = %inner.nodes_size,
                "Persisted trie from memory database"
            );
        }

        inner.gc_nodes = 0;
        inner.gc_size = StorageSize(0);
        inner.gc_time = Duration::ZERO;
        Ok(())
    }

    /// Current byte footprint of the node and preimage caches.
    pub fn size(&self) -> StorageSize {
        let inner = self.inner.read();
        StorageSize(inner.nodes_size.as_u64() + inner.preimages_size.as_u64())
    }
}

impl TrieDbInner {
    fn insert(&mut self, hash: B256, blob: &[u8]) {
        if self.nodes.contains_key(&hash) {
            return;
        }
        self.nodes.insert(
            hash,
            CachedNode {
                blob: Bytes::copy_from_slice(blob),
                parents: 0,
                children: HashMap::new(),
            },
        );
        self.nodes_size += (B256::len_bytes() + blob.len()) as u64;
    }

    fn reference(&mut self, child: B256, parent: B256) -> Result<(), TrieError> {
        // A child pulled from disk needs no reference tracking.
        if !self.nodes.contains_key(&child) {
            return Ok(());
        }
        let parent_node =
            self.nodes.get(&parent).ok_or(TrieError::UnknownParent { parent })?;
        if parent_node.children.contains_key(&child) && !parent.is_zero() {
            return Ok(());
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parents += 1;
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            *node.children.entry(child).or_insert(0) += 1;
        }
        Ok(())
    }

    fn dereference(&mut self, child: B256, parent: B256) -> Result<(), TrieError> {
        {
            let parent_node =
                self.nodes.get_mut(&parent).ok_or(TrieError::UnknownParent { parent })?;
            if let Some(count) = parent_node.children.get_mut(&child) {
                *count -= 1;
                if *count == 0 {
                    parent_node.children.remove(&child);
                }
            }
        }
        // A child that is not cached was committed earlier; nothing to drop.
        let Some(node) = self.nodes.get_mut(&child) else { return Ok(()) };
        node.parents = node.parents.saturating_sub(1);
        if node.parents == 0 {
            let grandchildren: Vec<B256> = node.children.keys().copied().collect();
            for grandchild in grandchildren {
                self.dereference(grandchild, child)?;
            }
            let removed = self.nodes.remove(&child).expect("checked above");
            self.nodes_size -= (B256::len_bytes() + removed.blob.len()) as u64;
        }
        Ok(())
    }

    fn commit_node(&self, hash: B256, batch: &mut dyn Batch) -> Result<(), TrieError> {
        // A node missing from the cache was committed in an earlier cycle.
        let Some(node) = self.nodes.get(&hash) else { return Ok(()) };
        for child in node.children.keys() {
            self.commit_node(*child, batch)?;
        }
        batch.put(hash.as_slice(), &node.blob)?;
        if batch.value_size() >= IDEAL_BATCH_SIZE {
            batch.write()?;
            batch.reset();
        }
        Ok(())
    }

    fn uncache(&mut self, hash: B256) {
        let Some(node) = self.nodes.get(&hash) else { return };
        let children: Vec<B256> = node.children.keys().copied().collect();
        for child in children {
            self.uncache(child);
        }
        let removed = self.nodes.remove(&hash).expect("checked above");
        self.nodes_size -= (B256::len_bytes() + removed.blob.len()) as u64;
    }
}

/// The database key for the preimage of `hash`.
fn secure_key(hash: B256) -> [u8; SECURE_KEY_LENGTH] {
    let mut key = [0u8; SECURE_KEY_LENGTH];
    key[..SECURE_KEY_PREFIX.len()].copy_from_slice(SECURE_KEY_PREFIX);
    key[SECURE_KEY_PREFIX.len()..].copy_from_slice(hash.as_slice());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use ursa_db::{test_utils::FailingStore, MemoryKeyValueStore};

    fn hash(byte: u8) -> B256 {
        B256::repeat_byte(byte)
    }

    fn new_db() -> TrieDb {
        TrieDb::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn insert_is_idempotent_and_sized() {
        let db = new_db();
        db.insert(hash(1), b"node-one");
        db.insert(hash(1), b"ignored-duplicate");
        assert_eq!(db.size().as_u64(), 32 + 8);
        assert_eq!(db.node(hash(1)).unwrap().unwrap().as_ref(), b"node-one");
    }

    #[test]
    fn size_tracks_nodes_and_preimages() {
        let db = new_db();
        db.insert(hash(1), b"abc");
        db.insert(hash(2), b"defgh");
        db.insert_preimage(hash(3), b"key");
        db.insert_preimage(hash(3), b"dup");
        assert_eq!(db.size().as_u64(), (32 + 3) + (32 + 5) + (32 + 3));
    }

    #[test]
    fn dereference_cascades_through_children() {
        let db = new_db();
        // zero -> a -> b -> c, plus a -> c directly.
        db.insert(hash(0xa), b"a");
        db.insert(hash(0xb), b"b");
        db.insert(hash(0xc), b"c");
        db.reference(hash(0xc), hash(0xb)).unwrap();
        db.reference(hash(0xb), hash(0xa)).unwrap();
        db.reference(hash(0xc), hash(0xa)).unwrap();
        db.reference(hash(0xa), B256::ZERO).unwrap();

        db.dereference(hash(0xa), B256::ZERO).unwrap();
        assert!(db.nodes().is_empty());
        assert_eq!(db.size().as_u64(), 0);
    }

    #[test]
    fn dereference_keeps_shared_children() {
        let db = new_db();
        db.insert(hash(0xa), b"a");
        db.insert(hash(0xb), b"b");
        db.insert(hash(0xc), b"shared");
        db.reference(hash(0xc), hash(0xa)).unwrap();
        db.reference(hash(0xc), hash(0xb)).unwrap();
        db.reference(hash(0xa), B256::ZERO).unwrap();
        db.reference(hash(0xb), B256::ZERO).unwrap();

        db.dereference(hash(0xa), B256::ZERO).unwrap();
        assert!(!db.contains(hash(0xa)));
        assert!(db.contains(hash(0xc)), "shared child must survive");

        db.dereference(hash(0xb), B256::ZERO).unwrap();
        assert!(db.nodes().is_empty());
    }

    #[test]
    fn root_pins_are_counted_not_deduplicated() {
        let db = new_db();
        db.insert(hash(0xa), b"a");
        db.reference(hash(0xa), B256::ZERO).unwrap();
        db.reference(hash(0xa), B256::ZERO).unwrap();

        db.dereference(hash(0xa), B256::ZERO).unwrap();
        assert!(db.contains(hash(0xa)), "double-pinned root survives one unpin");
        db.dereference(hash(0xa), B256::ZERO).unwrap();
        assert!(!db.contains(hash(0xa)));
    }

    #[test]
    fn ordinary_edges_deduplicate() {
        let db = new_db();
        db.insert(hash(0xa), b"a");
        db.insert(hash(0xb), b"b");
        db.reference(hash(0xb), hash(0xa)).unwrap();
        db.reference(hash(0xb), hash(0xa)).unwrap();
        db.reference(hash(0xa), B256::ZERO).unwrap();

        // One dereference must be enough to cascade b away with a.
        db.dereference(hash(0xa), B256::ZERO).unwrap();
        assert!(db.nodes().is_empty());
    }

    #[test]
    fn unknown_parent_is_a_typed_error() {
        let db = new_db();
        db.insert(hash(0xa), b"a");
        let err = db.dereference(hash(0xa), hash(0xff)).unwrap_err();
        assert_eq!(err, TrieError::UnknownParent { parent: hash(0xff) });
        let err = db.reference(hash(0xa), hash(0xff)).unwrap_err();
        assert_eq!(err, TrieError::UnknownParent { parent: hash(0xff) });
    }

    #[test]
    fn commit_flushes_subdag_and_uncaches() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let db = TrieDb::new(store.clone());
        db.insert(hash(0xa), b"a");
        db.insert(hash(0xb), b"b");
        db.reference(hash(0xb), hash(0xa)).unwrap();
        db.reference(hash(0xa), B256::ZERO).unwrap();
        db.insert_preimage(hash(0x5), b"preimage");

        db.commit(hash(0xa), false).unwrap();

        assert!(store.has(hash(0xa).as_slice()).unwrap());
        assert!(store.has(hash(0xb).as_slice()).unwrap());
        assert!(store.has(&secure_key(hash(0x5))).unwrap());
        assert!(db.nodes().is_empty());
        assert_eq!(db.size().as_u64(), 0);
        // Reads fall through to disk after uncaching.
        assert_eq!(db.node(hash(0xb)).unwrap().unwrap().as_ref(), b"b");
        assert_eq!(db.preimage(hash(0x5)).unwrap().unwrap().as_ref(), b"preimage");
    }

    #[test]
    fn commit_of_persisted_root_only_flushes_preimages() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let db = TrieDb::new(store.clone());
        db.insert_preimage(hash(0x5), b"preimage");
        db.commit(hash(0x77), false).unwrap();
        assert!(store.has(&secure_key(hash(0x5))).unwrap());
        assert!(!store.has(hash(0x77).as_slice()).unwrap());
    }

    #[test]
    fn failed_commit_leaves_cache_intact() {
        let store = Arc::new(FailingStore::new());
        let db = TrieDb::new(store.clone());
        db.insert(hash(0xa), b"a");
        db.insert(hash(0xb), b"b");
        db.reference(hash(0xb), hash(0xa)).unwrap();
        db.reference(hash(0xa), B256::ZERO).unwrap();
        db.insert_preimage(hash(0x5), b"preimage");
        let size_before = db.size();

        store.set_fail_writes(true);
        let err = db.commit(hash(0xa), false).unwrap_err();
        assert!(matches!(err, TrieError::Database(_)));

        // Phase B must not have run: nothing uncached, nothing cleared.
        assert_eq!(db.size(), size_before);
        assert!(db.contains(hash(0xa)));
        assert!(db.contains(hash(0xb)));
        assert_eq!(db.preimage(hash(0x5)).unwrap().unwrap().as_ref(), b"preimage");
        assert!(store.inner().is_empty());

        // And the retry succeeds once the store recovers.
        store.set_fail_writes(false);
        db.commit(hash(0xa), false).unwrap();
        assert!(db.nodes().is_empty());
    }
}
