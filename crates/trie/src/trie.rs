use crate::{
    db::TrieDb,
    node::{
        encode_branch, encode_extension, encode_leaf, BranchNode, Node, NodeRef,
        pack_nibbles,
    },
    TrieError,
};
use alloy_primitives::{keccak256, Bytes, B256};
use nybbles::Nibbles;
use std::{mem, sync::Arc};
use ursa_primitives::EMPTY_ROOT_HASH;

/// Callback invoked for every value sealed into a hashed node during a
/// commit, together with the hash of the node holding it. The account layer
/// uses it to wire storage roots and code hashes into the reference graph of
/// the enclosing account trie.
pub type LeafCallback<'a> = &'a mut dyn FnMut(&[u8], B256);

/// Reborrows an optional leaf callback for a shorter lifetime than the one
/// it was originally given, so it can be used more than once in the same
/// scope. A plain `.as_deref_mut()` call cannot shrink the lifetime of a
/// `&mut dyn FnMut` behind an `Option`, forcing the reborrow to last as long
/// as the original binding.
fn reborrow_on_leaf<'a>(on_leaf: &'a mut Option<LeafCallback<'_>>) -> Option<LeafCallback<'a>> {
    match on_leaf {
        Some(f) => Some(&mut **f),
        None => None,
    }
}

/// A Merkle-Patricia trie resolving nodes through a [`TrieDb`].
///
/// Handles are copy-on-write: mutations touch only the in-memory node tree
/// and materialize a new root on [`Trie::hash`] or [`Trie::commit`].
#[derive(Clone, Debug)]
pub struct Trie {
    root: Node,
    db: Arc<TrieDb>,
}

impl Trie {
    /// Opens the trie rooted at `root`.
    ///
    /// Returns [`TrieError::MissingNode`] when the root is neither cached
    /// nor persisted.
    pub fn new(root: B256, db: Arc<TrieDb>) -> Result<Self, TrieError> {
        if root == EMPTY_ROOT_HASH || root.is_zero() {
            return Ok(Self { root: Node::Empty, db });
        }
        let node = resolve_hash(&db, root)?;
        Ok(Self { root: node, db })
    }

    /// The node cache this trie resolves through.
    pub fn db(&self) -> &Arc<TrieDb> {
        &self.db
    }

    /// Looks up `key`, resolving nodes from the cache/store as needed.
    /// Resolved nodes are memoized into the handle.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>, TrieError> {
        let path = Nibbles::unpack(key);
        get_at(&self.db, &mut self.root, &path)
    }

    /// Inserts `key -> value`. An empty value removes the key.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        if value.is_empty() {
            return self.remove(key);
        }
        let path = Nibbles::unpack(key);
        let root = mem::replace(&mut self.root, Node::Empty);
        self.root = insert_at(&self.db, root, &path, Bytes::copy_from_slice(value))?;
        Ok(())
    }

    /// Removes `key` if present, collapsing any single-child branches left
    /// behind.
    pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let path = Nibbles::unpack(key);
        let root = mem::replace(&mut self.root, Node::Empty);
        let (root, _) = remove_at(&self.db, root, &path)?;
        self.root = root;
        Ok(())
    }

    /// The root hash of the current trie content, computed without touching
    /// the node cache.
    pub fn hash(&self) -> B256 {
        let mut fold = Fold { db: None, on_leaf: None };
        // Writes are disabled, so folding cannot fail.
        let sealed = fold.fold(&self.root).expect("pure fold is infallible");
        match sealed.reference {
            NodeRef::Empty => EMPTY_ROOT_HASH,
            NodeRef::Hash(hash) => hash,
            NodeRef::Inline(encoded) => keccak256(&encoded),
        }
    }

    /// Hashes the trie and inserts every hashed node into the node cache,
    /// wiring parent-child references. Returns the new root hash.
    ///
    /// This only stages the trie in memory; durability is a separate
    /// [`TrieDb::commit`].
    pub fn commit(&mut self, mut on_leaf: Option<LeafCallback<'_>>) -> Result<B256, TrieError> {
        let root = {
            let mut fold = Fold { db: Some(&self.db), on_leaf: reborrow_on_leaf(&mut on_leaf) };
            let sealed = fold.fold(&self.root)?;
            match sealed.reference {
                NodeRef::Empty => EMPTY_ROOT_HASH,
                NodeRef::Hash(hash) => hash,
                NodeRef::Inline(encoded) => {
                    // A root shorter than a hash is stored under its hash
                    // anyway so it can be reopened by it.
                    let hash = keccak256(&encoded);
                    self.db.insert(hash, &encoded);
                    for child in sealed.pending.children {
                        self.db.reference(child, hash)?;
                    }
                    if let Some(on_leaf) = reborrow_on_leaf(&mut on_leaf) {
                        for value in &sealed.pending.values {
                            on_leaf(value, hash);
                        }
                    }
                    hash
                }
            }
        };
        self.root = if root == EMPTY_ROOT_HASH { Node::Empty } else { Node::Hash(root) };
        Ok(root)
    }

    /// Walks every leaf in key order, invoking `f` with the packed key bytes
    /// and the stored value.
    pub fn for_each_leaf(
        &self,
        f: &mut dyn FnMut(&[u8], &[u8]),
    ) -> Result<(), TrieError> {
        let mut prefix = Vec::new();
        walk(&self.db, &self.root, &mut prefix, f)
    }
}

fn resolve_hash(db: &TrieDb, hash: B256) -> Result<Node, TrieError> {
    let Some(blob) = db.node(hash)? else {
        return Err(TrieError::MissingNode { hash });
    };
    Node::decode(&blob).map_err(|reason| TrieError::InvalidNode { hash, reason })
}

fn get_at(db: &TrieDb, node: &mut Node, path: &[u8]) -> Result<Option<Bytes>, TrieError> {
    match node {
        Node::Empty => Ok(None),
        Node::Hash(hash) => {
            *node = resolve_hash(db, *hash)?;
            get_at(db, node, path)
        }
        Node::Leaf { path: leaf_path, value } => {
            Ok((&leaf_path[..] == path).then(|| value.clone()))
        }
        Node::Extension { path: ext_path, child } => match path.strip_prefix(&ext_path[..]) {
            Some(rest) => get_at(db, child, rest),
            None => Ok(None),
        },
        Node::Branch(branch) => match path.split_first() {
            None => Ok(branch.value.clone()),
            Some((&slot, rest)) => get_at(db, &mut branch.children[slot as usize], rest),
        },
    }
}

fn insert_at(db: &TrieDb, node: Node, path: &[u8], value: Bytes) -> Result<Node, TrieError> {
    match node {
        Node::Empty => Ok(Node::Leaf { path: Nibbles::from_nibbles(path), value }),
        Node::Hash(hash) => {
            let resolved = resolve_hash(db, hash)?;
            insert_at(db, resolved, path, value)
        }
        Node::Leaf { path: leaf_path, value: leaf_value } => {
            if &leaf_path[..] == path {
                return Ok(Node::Leaf { path: leaf_path, value });
            }
            let common = common_prefix(&leaf_path, path);
            let mut branch = BranchNode::default();
            put_remainder(&mut branch, &leaf_path[common..], leaf_value);
            put_remainder(&mut branch, &path[common..], value);
            Ok(wrap_in_extension(&path[..common], Node::Branch(Box::new(branch))))
        }
        Node::Extension { path: ext_path, child } => {
            let common = common_prefix(&ext_path, path);
            if common == ext_path.len() {
                let child = insert_at(db, *child, &path[common..], value)?;
                return Ok(Node::Extension { path: ext_path, child: Box::new(child) });
            }
            let mut branch = BranchNode::default();
            let slot = ext_path[common] as usize;
            branch.children[slot] = if common + 1 == ext_path.len() {
                *child
            } else {
                Node::Extension {
                    path: Nibbles::from_nibbles(&ext_path[common + 1..]),
                    child,
                }
            };
            put_remainder(&mut branch, &path[common..], value);
            Ok(wrap_in_extension(&path[..common], Node::Branch(Box::new(branch))))
        }
        Node::Branch(mut branch) => {
            match path.split_first() {
                None => branch.value = Some(value),
                Some((&slot, rest)) => {
                    let slot = slot as usize;
                    let child = mem::replace(&mut branch.children[slot], Node::Empty);
                    branch.children[slot] = insert_at(db, child, rest, value)?;
                }
            }
            Ok(Node::Branch(branch))
        }
    }
}

/// Places `value` at `remainder` below a fresh branch: either as the branch
/// value (empty remainder) or as a leaf under the first nibble.
fn put_remainder(branch: &mut BranchNode, remainder: &[u8], value: Bytes) {
    match remainder.split_first() {
        None => branch.value = Some(value),
        Some((&slot, rest)) => {
            branch.children[slot as usize] =
                Node::Leaf { path: Nibbles::from_nibbles(rest), value };
        }
    }
}

fn wrap_in_extension(prefix: &[u8], node: Node) -> Node {
    if prefix.is_empty() {
        node
    } else {
        Node::Extension { path: Nibbles::from_nibbles(prefix), child: Box::new(node) }
    }
}

fn remove_at(db: &TrieDb, node: Node, path: &[u8]) -> Result<(Node, bool), TrieError> {
    match node {
        Node::Empty => Ok((Node::Empty, false)),
        Node::Hash(hash) => {
            let resolved = resolve_hash(db, hash)?;
            remove_at(db, resolved, path)
        }
        Node::Leaf { path: leaf_path, value } => {
            if &leaf_path[..] == path {
                Ok((Node::Empty, true))
            } else {
                Ok((Node::Leaf { path: leaf_path, value }, false))
            }
        }
        Node::Extension { path: ext_path, child } => {
            let Some(rest) = path.strip_prefix(&ext_path[..]) else {
                return Ok((Node::Extension { path: ext_path, child }, false));
            };
            let (new_child, changed) = remove_at(db, *child, rest)?;
            if !changed {
                return Ok((
                    Node::Extension { path: ext_path, child: Box::new(new_child) },
                    false,
                ));
            }
            Ok((merge_extension(db, &ext_path, new_child)?, true))
        }
        Node::Branch(mut branch) => {
            let changed = match path.split_first() {
                None => branch.value.take().is_some(),
                Some((&slot, rest)) => {
                    let slot = slot as usize;
                    let child = mem::replace(&mut branch.children[slot], Node::Empty);
                    let (new_child, changed) = remove_at(db, child, rest)?;
                    branch.children[slot] = new_child;
                    changed
                }
            };
            if !changed {
                return Ok((Node::Branch(branch), false));
            }
            Ok((collapse_branch(db, branch)?, true))
        }
    }
}

/// Re-attaches `child` below an extension prefix, merging path segments so
/// no extension ever points at another short node.
fn merge_extension(db: &TrieDb, prefix: &[u8], child: Node) -> Result<Node, TrieError> {
    let child = match child {
        Node::Hash(hash) => resolve_hash(db, hash)?,
        other => other,
    };
    Ok(match child {
        Node::Empty => Node::Empty,
        Node::Leaf { path, value } => {
            Node::Leaf { path: join_nibbles(prefix, &path), value }
        }
        Node::Extension { path, child } => {
            Node::Extension { path: join_nibbles(prefix, &path), child }
        }
        branch @ Node::Branch(_) => {
            Node::Extension { path: Nibbles::from_nibbles(prefix), child: Box::new(branch) }
        }
        Node::Hash(_) => unreachable!("resolved above"),
    })
}

/// Collapses a branch that may have dropped to a single occupant.
fn collapse_branch(db: &TrieDb, branch: Box<BranchNode>) -> Result<Node, TrieError> {
    let live = branch.live_children();
    if live == 0 {
        return Ok(match branch.value {
            Some(value) => Node::Leaf { path: Nibbles::default(), value },
            None => Node::Empty,
        });
    }
    if live == 1 && branch.value.is_none() {
        let mut branch = branch;
        let slot = branch
            .children
            .iter()
            .position(|child| !matches!(child, Node::Empty))
            .expect("live == 1");
        let child = mem::replace(&mut branch.children[slot], Node::Empty);
        return merge_extension(db, &[slot as u8], child);
    }
    Ok(Node::Branch(branch))
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn join_nibbles(a: &[u8], b: &[u8]) -> Nibbles {
    let mut joined = Vec::with_capacity(a.len() + b.len());
    joined.extend_from_slice(a);
    joined.extend_from_slice(b);
    Nibbles::from_nibbles(joined)
}

/// Hashes and children awaiting attribution to the nearest hashed ancestor
/// of an inline node.
#[derive(Default)]
struct Pending {
    children: Vec<B256>,
    values: Vec<Bytes>,
}

impl Pending {
    fn merge(&mut self, other: Pending) {
        self.children.extend(other.children);
        self.values.extend(other.values);
    }
}

struct Sealed {
    reference: NodeRef,
    pending: Pending,
}

/// Bottom-up node folding shared by [`Trie::hash`] (no store) and
/// [`Trie::commit`] (inserts hashed nodes and references into the cache).
struct Fold<'a, 'b> {
    db: Option<&'a TrieDb>,
    on_leaf: Option<&'b mut dyn FnMut(&[u8], B256)>,
}

impl Fold<'_, '_> {
    fn fold(&mut self, node: &Node) -> Result<Sealed, TrieError> {
        match node {
            Node::Empty => {
                Ok(Sealed { reference: NodeRef::Empty, pending: Pending::default() })
            }
            Node::Hash(hash) => Ok(Sealed {
                reference: NodeRef::Hash(*hash),
                pending: Pending::default(),
            }),
            Node::Leaf { path, value } => {
                let mut encoded = Vec::new();
                encode_leaf(path, value, &mut encoded);
                let mut pending = Pending::default();
                pending.values.push(value.clone());
                Ok(self.seal(encoded, pending))
            }
            Node::Extension { path, child } => {
                let child = self.fold(child)?;
                let mut pending = Pending::default();
                self.absorb(&mut pending, &child);
                let mut encoded = Vec::new();
                encode_extension(path, &child.reference, &mut encoded);
                Ok(self.seal(encoded, pending))
            }
            Node::Branch(branch) => {
                let mut pending = Pending::default();
                let mut references: [NodeRef; 16] = std::array::from_fn(|_| NodeRef::Empty);
                for (slot, child) in branch.children.iter().enumerate() {
                    let sealed = self.fold(child)?;
                    self.absorb(&mut pending, &sealed);
                    references[slot] = sealed.reference;
                }
                if let Some(value) = &branch.value {
                    pending.values.push(value.clone());
                }
                let mut encoded = Vec::new();
                encode_branch(&references, branch.value.as_deref().map(|v| &**v), &mut encoded);
                Ok(self.seal(encoded, pending))
            }
        }
    }

    /// Moves a folded child's obligations into the parent: hashed children
    /// become reference edges, inline children hand their pendings upward.
    fn absorb(&mut self, pending: &mut Pending, child: &Sealed) {
        match &child.reference {
            NodeRef::Hash(hash) => pending.children.push(*hash),
            NodeRef::Empty | NodeRef::Inline(_) => {}
        }
        pending.children.extend(child.pending.children.iter().copied());
        pending.values.extend(child.pending.values.iter().cloned());
    }

    fn seal(&mut self, encoded: Vec<u8>, pending: Pending) -> Sealed {
        if encoded.len() < 32 {
            return Sealed { reference: NodeRef::Inline(encoded), pending };
        }
        let hash = keccak256(&encoded);
        if let Some(db) = self.db {
            db.insert(hash, &encoded);
            for child in &pending.children {
                // Children were inserted before their parent in this fold,
                // so the parent is always known.
                let _ = db.reference(*child, hash);
            }
            if let Some(on_leaf) = self.on_leaf.as_deref_mut() {
                for value in &pending.values {
                    on_leaf(value, hash);
                }
            }
        }
        Sealed { reference: NodeRef::Hash(hash), pending: Pending::default() }
    }
}

fn walk(
    db: &TrieDb,
    node: &Node,
    prefix: &mut Vec<u8>,
    f: &mut dyn FnMut(&[u8], &[u8]),
) -> Result<(), TrieError> {
    match node {
        Node::Empty => Ok(()),
        Node::Hash(hash) => {
            let resolved = resolve_hash(db, *hash)?;
            walk(db, &resolved, prefix, f)
        }
        Node::Leaf { path, value } => {
            let len = prefix.len();
            prefix.extend_from_slice(path);
            f(&pack_nibbles(prefix), value);
            prefix.truncate(len);
            Ok(())
        }
        Node::Extension { path, child } => {
            let len = prefix.len();
            prefix.extend_from_slice(path);
            walk(db, child, prefix, f)?;
            prefix.truncate(len);
            Ok(())
        }
        Node::Branch(branch) => {
            if let Some(value) = &branch.value {
                f(&pack_nibbles(prefix), value);
            }
            for (slot, child) in branch.children.iter().enumerate() {
                if matches!(child, Node::Empty) {
                    continue;
                }
                prefix.push(slot as u8);
                walk(db, child, prefix, f)?;
                prefix.pop();
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_trie::HashBuilder;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::BTreeMap;
    use ursa_db::{KeyValueStore, MemoryKeyValueStore};

    fn new_db() -> Arc<TrieDb> {
        Arc::new(TrieDb::new(Arc::new(MemoryKeyValueStore::new())))
    }

    fn empty_trie() -> Trie {
        Trie::new(EMPTY_ROOT_HASH, new_db()).unwrap()
    }

    #[test]
    fn empty_trie_root() {
        let trie = empty_trie();
        assert_eq!(trie.hash(), EMPTY_ROOT_HASH);
        assert_eq!(EMPTY_ROOT_HASH, alloy_trie::EMPTY_ROOT_HASH);
    }

    #[test]
    fn insert_get_overwrite() {
        let mut trie = empty_trie();
        trie.insert(b"doe", b"reindeer").unwrap();
        trie.insert(b"dog", b"puppy").unwrap();
        trie.insert(b"dogglesworth", b"cat").unwrap();

        assert_eq!(trie.get(b"doe").unwrap().unwrap().as_ref(), b"reindeer");
        assert_eq!(trie.get(b"dog").unwrap().unwrap().as_ref(), b"puppy");
        assert_eq!(trie.get(b"dogglesworth").unwrap().unwrap().as_ref(), b"cat");
        assert_eq!(trie.get(b"unknown").unwrap(), None);

        trie.insert(b"dog", b"hound").unwrap();
        assert_eq!(trie.get(b"dog").unwrap().unwrap().as_ref(), b"hound");
    }

    #[test]
    fn removal_restores_prior_root() {
        let mut trie = empty_trie();
        trie.insert(b"alpha", b"1").unwrap();
        trie.insert(b"beta", b"2").unwrap();
        let before = trie.hash();

        trie.insert(b"gamma", b"3").unwrap();
        assert_ne!(trie.hash(), before);
        trie.remove(b"gamma").unwrap();
        assert_eq!(trie.hash(), before);

        trie.remove(b"alpha").unwrap();
        trie.remove(b"beta").unwrap();
        assert_eq!(trie.hash(), EMPTY_ROOT_HASH);
    }

    #[test]
    fn insert_empty_value_removes_key() {
        let mut trie = empty_trie();
        trie.insert(b"alpha", b"1").unwrap();
        let root = trie.hash();
        trie.insert(b"beta", b"2").unwrap();
        trie.insert(b"beta", b"").unwrap();
        assert_eq!(trie.hash(), root);
        assert_eq!(trie.get(b"beta").unwrap(), None);
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let mut a = empty_trie();
        let mut b = empty_trie();
        let entries: Vec<(Vec<u8>, Vec<u8>)> =
            (0u16..64).map(|i| (i.to_be_bytes().to_vec(), vec![i as u8; 3])).collect();
        for (key, value) in &entries {
            a.insert(key, value).unwrap();
        }
        for (key, value) in entries.iter().rev() {
            b.insert(key, value).unwrap();
        }
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn root_matches_hash_builder() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut entries = BTreeMap::new();
        for _ in 0..256 {
            let key = B256::from(rng.gen::<[u8; 32]>());
            let value: Vec<u8> = (0..rng.gen_range(1..40)).map(|_| rng.gen()).collect();
            entries.insert(key, value);
        }

        let mut trie = empty_trie();
        for (key, value) in &entries {
            trie.insert(key.as_slice(), value).unwrap();
        }

        let mut hb = HashBuilder::default();
        for (key, value) in &entries {
            hb.add_leaf(Nibbles::unpack(key), value);
        }
        assert_eq!(trie.hash(), hb.root());
    }

    #[test]
    fn commit_reopen_reads_back() {
        let db = new_db();
        let mut trie = Trie::new(EMPTY_ROOT_HASH, db.clone()).unwrap();
        for i in 0u16..128 {
            trie.insert(&i.to_be_bytes(), format!("value-{i}").as_bytes()).unwrap();
        }
        let hashed = trie.hash();
        let root = trie.commit(None).unwrap();
        assert_eq!(root, hashed);

        let mut reopened = Trie::new(root, db).unwrap();
        for i in 0u16..128 {
            assert_eq!(
                reopened.get(&i.to_be_bytes()).unwrap().unwrap().as_ref(),
                format!("value-{i}").as_bytes()
            );
        }
    }

    #[test]
    fn committed_trie_survives_disk_flush_and_uncache() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let db = Arc::new(TrieDb::new(store.clone()));
        let mut trie = Trie::new(EMPTY_ROOT_HASH, db.clone()).unwrap();
        for i in 0u16..128 {
            trie.insert(&i.to_be_bytes(), &[i as u8; 40]).unwrap();
        }
        let root = trie.commit(None).unwrap();
        db.reference(root, B256::ZERO).unwrap();
        db.commit(root, false).unwrap();

        // Every committed node is durable.
        assert!(store.has(root.as_slice()).unwrap());
        assert!(db.nodes().is_empty());

        // Reopening resolves from disk.
        let mut reopened = Trie::new(root, db).unwrap();
        assert_eq!(reopened.get(&5u16.to_be_bytes()).unwrap().unwrap().as_ref(), &[5; 40]);
    }

    #[test]
    fn dereference_drops_whole_trie_from_cache() {
        let db = new_db();
        let mut trie = Trie::new(EMPTY_ROOT_HASH, db.clone()).unwrap();
        for i in 0u16..128 {
            trie.insert(&i.to_be_bytes(), &[i as u8; 40]).unwrap();
        }
        let root = trie.commit(None).unwrap();
        db.reference(root, B256::ZERO).unwrap();
        assert!(!db.nodes().is_empty());

        db.dereference(root, B256::ZERO).unwrap();
        assert!(db.nodes().is_empty());
        assert_eq!(db.size().as_u64(), 0);
    }

    #[test]
    fn missing_root_is_typed() {
        let err = Trie::new(B256::repeat_byte(0x13), new_db()).unwrap_err();
        assert!(err.is_missing_node());
    }

    #[test]
    fn for_each_leaf_visits_all_entries() {
        let mut trie = empty_trie();
        let mut expected = BTreeMap::new();
        for i in 0u8..32 {
            let key = [i; 4];
            trie.insert(&key, &[i, i]).unwrap();
            expected.insert(key.to_vec(), vec![i, i]);
        }
        let mut seen = BTreeMap::new();
        trie.for_each_leaf(&mut |key, value| {
            seen.insert(key.to_vec(), value.to_vec());
        })
        .unwrap();
        assert_eq!(seen, expected);
    }
}
