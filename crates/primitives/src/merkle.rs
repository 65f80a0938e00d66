//! Binary Merkle trees with domain-separated leaves and interior nodes.
//!
//! A list of `n > 1` items splits at the largest power of two strictly below
//! `n`; the left subtree is always full. Leaves hash as `sha256(0x00 || item)`,
//! interior nodes as `sha256(0x01 || left || right)`, and the empty list as
//! `sha256("")`.

use btmd_consensus::Hash256;
use sha2::{Digest, Sha256};

use crate::hash::sha256;

const LEAF_PREFIX: u8 = 0x00;
const INTERIOR_PREFIX: u8 = 0x01;

pub fn merkle_root<T: AsRef<[u8]>>(items: &[T]) -> Hash256 {
    match items.len() {
        0 => sha256(b""),
        1 => leaf_hash(items[0].as_ref()),
        n => {
            let split = split_point(n);
            let left = merkle_root(&items[..split]);
            let right = merkle_root(&items[split..]);
            interior_hash(&left, &right)
        }
    }
}

fn leaf_hash(item: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(item);
    sha256_finish(hasher)
}

fn interior_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update([INTERIOR_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    sha256_finish(hasher)
}

fn sha256_finish(hasher: Sha256) -> Hash256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn split_point(n: usize) -> usize {
    let mut split = 1;
    while split * 2 < n {
        split *= 2;
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_largest_power_of_two_below() {
        assert_eq!(split_point(2), 1);
        assert_eq!(split_point(3), 2);
        assert_eq!(split_point(4), 2);
        assert_eq!(split_point(5), 4);
        assert_eq!(split_point(9), 8);
    }

    #[test]
    fn single_leaf_differs_from_raw_hash() {
        let item = [7u8; 32];
        assert_ne!(merkle_root(&[item]), sha256(&item));
        assert_eq!(merkle_root(&[item]), leaf_hash(&item));
    }

    #[test]
    fn order_matters() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
        assert_eq!(
            merkle_root(&[a, b]),
            interior_hash(&leaf_hash(&a), &leaf_hash(&b))
        );
    }

    #[test]
    fn empty_tree_is_hash_of_nothing() {
        let empty: [Hash256; 0] = [];
        assert_eq!(merkle_root(&empty), sha256(b""));
    }
}
