//! RFC 6962 Merkle tree hashing over SHA-256.
//!
//! Leaves are hashed as `SHA256(0x00 || data)` and interior nodes as
//! `SHA256(0x01 || left || right)`. A tree of `n > 1` leaves is split at the
//! largest power of two strictly smaller than `n`, so trees of every size are
//! well defined without padding.

use acp_common::Sha256Hash;

const LEAF_PREFIX: [u8; 1] = [0x00];
const NODE_PREFIX: [u8; 1] = [0x01];

/// Hash of a leaf.
pub fn leaf_hash(data: &[u8]) -> Sha256Hash {
    Sha256Hash::hash_iter([LEAF_PREFIX.as_slice(), data])
}

/// Hash of an interior node.
pub fn node_hash(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    Sha256Hash::hash_iter([NODE_PREFIX.as_slice(), left.as_ref(), right.as_ref()])
}

/// Largest power of two strictly smaller than `n`, for `n >= 2`.
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}

/// Root over already-hashed leaves. `None` for an empty tree.
pub fn root(leaves: &[Sha256Hash]) -> Option<Sha256Hash> {
    match leaves.len() {
        0 => None,
        1 => Some(leaves[0]),
        n => {
            let (left, right) = leaves.split_at(split_point(n));
            Some(node_hash(&root(left)?, &root(right)?))
        }
    }
}

/// Inclusion path for the leaf at `index`, ordered from the leaf up.
/// `None` if `index` is out of range.
pub fn inclusion_path(leaves: &[Sha256Hash], index: usize) -> Option<Vec<Sha256Hash>> {
    if index >= leaves.len() {
        return None;
    }
    let mut path = Vec::new();
    collect_path(leaves, index, &mut path)?;
    Some(path)
}

fn collect_path(leaves: &[Sha256Hash], index: usize, path: &mut Vec<Sha256Hash>) -> Option<()> {
    if leaves.len() <= 1 {
        return Some(());
    }
    let k = split_point(leaves.len());
    let (left, right) = leaves.split_at(k);
    if index < k {
        collect_path(left, index, path)?;
        path.push(root(right)?);
    } else {
        collect_path(right, index - k, path)?;
        path.push(root(left)?);
    }
    Some(())
}

/// Checks that `path` leads from `leaf` at `index` in a tree of `size` leaves
/// to `root`, following RFC 9162 section 2.1.3.2.
///
/// Any inconsistency between `index`, `size` and the path length yields
/// `false`.
pub fn verify_inclusion(
    leaf: &Sha256Hash,
    index: u64,
    size: u64,
    path: &[Sha256Hash],
    root: &Sha256Hash,
) -> bool {
    if index >= size {
        return false;
    }
    let (mut fn_, mut sn) = (index, size - 1);
    let mut hash = *leaf;
    for sibling in path {
        if sn == 0 {
            return false;
        }
        if fn_ & 1 == 1 || fn_ == sn {
            hash = node_hash(sibling, &hash);
            while fn_ & 1 == 0 && fn_ != 0 {
                fn_ >>= 1;
                sn >>= 1;
            }
        } else {
            hash = node_hash(&hash, sibling);
        }
        fn_ >>= 1;
        sn >>= 1;
    }
    sn == 0 && hash == *root
}
