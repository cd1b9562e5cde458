use alloy_primitives::{Bytes, B256};
use alloy_rlp::{Encodable, Header};
use nybbles::Nibbles;

/// A node of the Merkle-Patricia trie, in its resolved in-memory form.
///
/// Children larger than 31 encoded bytes are referenced by hash and resolved
/// lazily through the node cache; smaller children are carried inline, as
/// the wire encoding does.
#[derive(Clone, Debug)]
pub(crate) enum Node {
    /// Absent child / empty trie.
    Empty,
    /// Terminal node carrying a value at the remaining key path.
    Leaf {
        /// Remaining key nibbles.
        path: Nibbles,
        /// Stored value.
        value: Bytes,
    },
    /// Shared key-path segment above a branch.
    Extension {
        /// Shared nibbles.
        path: Nibbles,
        /// The node below the shared segment.
        child: Box<Node>,
    },
    /// Sixteen-way fork, optionally carrying a value terminating here.
    Branch(Box<BranchNode>),
    /// An unresolved node, referenced by the hash of its encoding.
    Hash(B256),
}

/// The sixteen children and optional value of a branch node.
#[derive(Clone, Debug)]
pub(crate) struct BranchNode {
    pub(crate) children: [Node; 16],
    pub(crate) value: Option<Bytes>,
}

impl Default for BranchNode {
    fn default() -> Self {
        Self { children: std::array::from_fn(|_| Node::Empty), value: None }
    }
}

impl BranchNode {
    /// Number of non-empty children.
    pub(crate) fn live_children(&self) -> usize {
        self.children.iter().filter(|child| !matches!(child, Node::Empty)).count()
    }
}

/// How a node is referenced from its parent once encoded: not at all, by the
/// hash of its encoding, or inlined when the encoding is shorter than a hash.
#[derive(Clone, Debug)]
pub(crate) enum NodeRef {
    Empty,
    Hash(B256),
    Inline(Vec<u8>),
}

impl NodeRef {
    fn length(&self) -> usize {
        match self {
            Self::Empty => 1,
            Self::Hash(_) => 33,
            Self::Inline(encoded) => encoded.len(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Empty => out.push(alloy_rlp::EMPTY_STRING_CODE),
            Self::Hash(hash) => hash.as_slice().encode(out),
            Self::Inline(encoded) => out.extend_from_slice(encoded),
        }
    }
}

/// Encodes a leaf node: `[compact(path, leaf), value]`.
pub(crate) fn encode_leaf(path: &[u8], value: &[u8], out: &mut Vec<u8>) {
    let compact = encode_path(path, true);
    let payload_length = compact.as_slice().length() + value.length();
    Header { list: true, payload_length }.encode(out);
    compact.as_slice().encode(out);
    value.encode(out);
}

/// Encodes an extension node: `[compact(path, ext), child]`.
pub(crate) fn encode_extension(path: &[u8], child: &NodeRef, out: &mut Vec<u8>) {
    let compact = encode_path(path, false);
    let payload_length = compact.as_slice().length() + child.length();
    Header { list: true, payload_length }.encode(out);
    compact.as_slice().encode(out);
    child.encode(out);
}

/// Encodes a branch node: sixteen child references followed by the value.
pub(crate) fn encode_branch(children: &[NodeRef; 16], value: Option<&[u8]>, out: &mut Vec<u8>) {
    let value_length = value.map_or(1, |value| value.length());
    let payload_length =
        children.iter().map(NodeRef::length).sum::<usize>() + value_length;
    Header { list: true, payload_length }.encode(out);
    for child in children {
        child.encode(out);
    }
    match value {
        Some(value) => value.encode(out),
        None => out.push(alloy_rlp::EMPTY_STRING_CODE),
    }
}

/// Hex-prefix encodes a nibble path. The high flag bit marks leaves, the low
/// one odd-length paths.
pub(crate) fn encode_path(path: &[u8], leaf: bool) -> Vec<u8> {
    let flag: u8 = if leaf { 0x20 } else { 0x00 };
    let mut out = Vec::with_capacity(path.len() / 2 + 1);
    let rest = if path.len() % 2 == 1 {
        out.push(flag | 0x10 | path[0]);
        &path[1..]
    } else {
        out.push(flag);
        path
    };
    for pair in rest.chunks(2) {
        out.push(pair[0] << 4 | pair[1]);
    }
    out
}

/// Inverse of [`encode_path`]; returns the nibbles and the leaf flag.
pub(crate) fn decode_path(encoded: &[u8]) -> Result<(Nibbles, bool), &'static str> {
    let Some((&first, rest)) = encoded.split_first() else {
        return Err("empty path");
    };
    if first & 0xc0 != 0 {
        return Err("invalid path flags");
    }
    let leaf = first & 0x20 != 0;
    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if first & 0x10 != 0 {
        nibbles.push(first & 0x0f);
    }
    for &byte in rest {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    Ok((Nibbles::from_nibbles(nibbles), leaf))
}

/// Packs an even-length nibble sequence back into bytes.
pub(crate) fn pack_nibbles(nibbles: &[u8]) -> Vec<u8> {
    debug_assert!(nibbles.len() % 2 == 0, "leaf keys pack to whole bytes");
    nibbles.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect()
}

impl Node {
    /// Decodes a node from its RLP encoding.
    pub(crate) fn decode(buf: &[u8]) -> Result<Self, &'static str> {
        let items = split_list(buf)?;
        match items.len() {
            2 => {
                let Item::Str(compact) = items[0] else {
                    return Err("path must be a string");
                };
                let (path, leaf) = decode_path(compact)?;
                if leaf {
                    let Item::Str(value) = items[1] else {
                        return Err("leaf value must be a string");
                    };
                    Ok(Self::Leaf { path, value: Bytes::copy_from_slice(value) })
                } else {
                    let child = node_from_item(items[1])?;
                    Ok(Self::Extension { path, child: Box::new(child) })
                }
            }
            17 => {
                let mut branch = BranchNode::default();
                for (slot, item) in items[..16].iter().enumerate() {
                    branch.children[slot] = node_from_item(*item)?;
                }
                let Item::Str(value) = items[16] else {
                    return Err("branch value must be a string");
                };
                if !value.is_empty() {
                    branch.value = Some(Bytes::copy_from_slice(value));
                }
                Ok(Self::Branch(Box::new(branch)))
            }
            _ => Err("node must have 2 or 17 items"),
        }
    }
}

#[derive(Clone, Copy)]
enum Item<'a> {
    /// String payload.
    Str(&'a [u8]),
    /// Full encoding of an embedded list.
    List(&'a [u8]),
}

fn node_from_item(item: Item<'_>) -> Result<Node, &'static str> {
    match item {
        Item::Str(payload) if payload.is_empty() => Ok(Node::Empty),
        Item::Str(payload) if payload.len() == 32 => {
            Ok(Node::Hash(B256::from_slice(payload)))
        }
        Item::Str(_) => Err("child reference must be empty or a hash"),
        Item::List(full) => Node::decode(full),
    }
}

fn split_list(buf: &[u8]) -> Result<Vec<Item<'_>>, &'static str> {
    let mut outer = buf;
    let header = Header::decode(&mut outer).map_err(|_| "malformed list header")?;
    if !header.list {
        return Err("node must be a list");
    }
    if outer.len() < header.payload_length {
        return Err("truncated list payload");
    }
    let mut payload = &outer[..header.payload_length];

    let mut items = Vec::with_capacity(17);
    while !payload.is_empty() {
        let start = payload;
        let mut rest = payload;
        let item = Header::decode(&mut rest).map_err(|_| "malformed item header")?;
        let consumed = start.len() - rest.len();
        let total = consumed + item.payload_length;
        if start.len() < total {
            return Err("truncated item payload");
        }
        if item.list {
            items.push(Item::List(&start[..total]));
        } else {
            items.push(Item::Str(&start[consumed..total]));
        }
        payload = &start[total..];
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_codec_roundtrip() {
        for (nibbles, leaf) in [
            (vec![], true),
            (vec![0x1], false),
            (vec![0x1, 0x2], true),
            (vec![0xf, 0x0, 0xa], false),
            (vec![0x0, 0x1, 0x2, 0x3], true),
        ] {
            let encoded = encode_path(&nibbles, leaf);
            let (decoded, decoded_leaf) = decode_path(&encoded).unwrap();
            assert_eq!(&decoded[..], &nibbles[..]);
            assert_eq!(decoded_leaf, leaf);
        }
    }

    #[test]
    fn leaf_roundtrip() {
        let mut buf = Vec::new();
        encode_leaf(&[0x1, 0x2, 0x3], b"hello", &mut buf);
        match Node::decode(&buf).unwrap() {
            Node::Leaf { path, value } => {
                assert_eq!(&path[..], &[0x1, 0x2, 0x3]);
                assert_eq!(value.as_ref(), b"hello");
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn branch_with_hash_children_roundtrip() {
        let mut children: [NodeRef; 16] = std::array::from_fn(|_| NodeRef::Empty);
        let hash = B256::repeat_byte(0x42);
        children[3] = NodeRef::Hash(hash);
        let mut buf = Vec::new();
        encode_branch(&children, Some(b"v"), &mut buf);

        match Node::decode(&buf).unwrap() {
            Node::Branch(branch) => {
                assert!(matches!(branch.children[3], Node::Hash(h) if h == hash));
                assert_eq!(branch.live_children(), 1);
                assert_eq!(branch.value.as_deref().map(|v| &**v), Some(b"v".as_slice()));
            }
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn extension_with_inline_child_roundtrip() {
        let mut leaf = Vec::new();
        encode_leaf(&[0x4], b"x", &mut leaf);
        assert!(leaf.len() < 32);

        let mut buf = Vec::new();
        encode_extension(&[0x1, 0x2], &NodeRef::Inline(leaf), &mut buf);
        match Node::decode(&buf).unwrap() {
            Node::Extension { path, child } => {
                assert_eq!(&path[..], &[0x1, 0x2]);
                assert!(matches!(*child, Node::Leaf { .. }));
            }
            other => panic!("expected extension, got {other:?}"),
        }
    }
}
