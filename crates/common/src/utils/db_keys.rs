use crate::types::Hash;

/// Sled tree holding hash -> encoded link.
pub const LINKS_TREE: &str = "links";
/// Sled tree holding parent ++ child -> () for `get_next_links`.
pub const CHILDREN_TREE: &str = "children";
/// Sled tree holding seq -> hash for orphans, ordered oldest first.
pub const ORPHANS_TREE: &str = "orphans";
/// Sled tree holding engine bookkeeping.
pub const META_TREE: &str = "meta";

pub const GENESIS_KEY: &[u8] = b"genesis";
pub const BEST_KEY: &[u8] = b"best";
pub const SEQ_KEY: &[u8] = b"seq";

pub fn link_key(hash: &Hash) -> Vec<u8> {
    hash.0.to_vec()
}

/// Prefix-scannable key: every child of `parent` shares the first 32 bytes.
pub fn child_key(parent: &Hash, child: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(parent.0.len() + child.0.len());
    key.extend_from_slice(&parent.0);
    key.extend_from_slice(&child.0);
    key
}

pub fn child_from_key(key: &[u8]) -> Hash {
    Hash::from_slice(&key[key.len().saturating_sub(32)..])
}

/// Big-endian so that sled's byte order matches insertion order.
pub fn seq_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}
