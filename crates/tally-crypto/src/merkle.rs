use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_types::ContentHash;

use crate::hasher::{DualHasher, HasherError};

/// Bytes hashed to produce the root of a tree with no items.
pub const EMPTY_TREE_SEED: &[u8] = b"empty";

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Decode a wire position flag: `0` means the current node is the left
    /// child (sibling on the right), `1` the reverse.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Right),
            1 => Some(Self::Left),
            _ => None,
        }
    }

    /// Encode as a wire position flag.
    pub fn index(self) -> u8 {
        match self {
            Self::Right => 0,
            Self::Left => 1,
        }
    }
}

/// Binary Merkle tree over an ordered item list.
///
/// Leaf `i` is the dual hash of the canonical encoding of item `i`. Levels
/// are kept exactly as computed (an odd level is not padded in storage);
/// when pairing an odd level the trailing hash is paired with itself.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// The root hash of the tree.
    root: ContentHash,
    /// Leaf hashes, in item order.
    leaves: Vec<ContentHash>,
    /// Level 0 = leaves, last level = `[root]`. Empty for an empty tree.
    levels: Vec<Vec<ContentHash>>,
}

impl MerkleTree {
    /// Build a tree over `items` with the default hasher.
    pub fn build<T: Serialize>(items: &[T]) -> Result<Self, MerkleError> {
        Self::build_with(&DualHasher::default(), items)
    }

    /// Build a tree over `items` with a specific hasher.
    pub fn build_with<T: Serialize>(hasher: &DualHasher, items: &[T]) -> Result<Self, MerkleError> {
        let leaves = items
            .iter()
            .map(|item| hasher.hash_json(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_leaves(hasher, leaves))
    }

    /// Build a tree from precomputed leaf hashes.
    ///
    /// An empty list produces the canonical empty root. A single leaf is its
    /// own root.
    pub fn from_leaves(hasher: &DualHasher, leaves: Vec<ContentHash>) -> Self {
        if leaves.is_empty() {
            return Self {
                root: hasher.hash(EMPTY_TREE_SEED),
                leaves: vec![],
                levels: vec![],
            };
        }

        let mut levels: Vec<Vec<ContentHash>> = vec![leaves.clone()];
        let mut current = leaves.clone();

        while current.len() > 1 {
            let next: Vec<ContentHash> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hasher.combine(left, right),
                    [odd] => hasher.combine(odd, odd),
                    _ => unreachable!("chunks(2) yields one or two elements"),
                })
                .collect();
            levels.push(next.clone());
            current = next;
        }

        let root = current.swap_remove(0);
        Self {
            root,
            leaves,
            levels,
        }
    }

    pub fn root(&self) -> &ContentHash {
        &self.root
    }

    pub fn leaves(&self) -> &[ContentHash] {
        &self.leaves
    }

    pub fn levels(&self) -> &[Vec<ContentHash>] {
        &self.levels
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Index of the first leaf equal to `leaf`.
    pub fn position(&self, leaf: &ContentHash) -> Option<usize> {
        self.leaves.iter().position(|l| l == leaf)
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<Proof> {
        if index >= self.leaves.len() {
            return None;
        }

        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut indices = Vec::with_capacity(path.capacity());
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            // Odd level: the trailing node is its own sibling.
            let sibling = level.get(sibling_idx).unwrap_or(&level[idx]);
            path.push(sibling.clone());
            indices.push((idx % 2) as u8);
            idx /= 2;
        }

        Some(Proof {
            item_hash: self.leaves[index].clone(),
            path,
            indices,
            root: self.root.clone(),
        })
    }

    /// Generate an inclusion proof for the first leaf equal to `leaf`.
    pub fn prove_leaf(&self, leaf: &ContentHash) -> Result<Proof, MerkleError> {
        self.position(leaf)
            .and_then(|index| self.proof(index))
            .ok_or_else(|| MerkleError::ItemNotFound {
                item_hash: leaf.clone(),
            })
    }
}

/// Merkle inclusion proof.
///
/// Wire shape: `{item_hash, path: [hash, ...], indices: [0|1, ...], root}`.
/// Verification needs only the item, the proof, and the claimed root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Leaf hash of the proven item.
    pub item_hash: ContentHash,
    /// Sibling hashes from leaf level up to just below the root.
    pub path: Vec<ContentHash>,
    /// Position flag per level; see [`Side::from_index`].
    pub indices: Vec<u8>,
    /// Root of the tree the proof was taken from.
    pub root: ContentHash,
}

impl Proof {
    /// Decode a proof received as JSON.
    ///
    /// Missing or mistyped fields and an inconsistent shape are reported as
    /// [`MerkleError::MalformedProof`].
    pub fn from_value(value: Value) -> Result<Self, MerkleError> {
        let proof: Self = serde_json::from_value(value)
            .map_err(|e| MerkleError::MalformedProof(e.to_string()))?;
        proof.check_shape()?;
        Ok(proof)
    }

    /// The `(sibling, side)` steps from leaf to root.
    pub fn steps(&self) -> Result<Vec<(&ContentHash, Side)>, MerkleError> {
        self.check_shape()?;
        Ok(self
            .path
            .iter()
            .zip(&self.indices)
            .filter_map(|(sibling, &index)| Side::from_index(index).map(|side| (sibling, side)))
            .collect())
    }

    /// Check that `path` and `indices` line up and every flag is 0 or 1.
    pub fn check_shape(&self) -> Result<(), MerkleError> {
        if self.path.len() != self.indices.len() {
            return Err(MerkleError::MalformedProof(format!(
                "path has {} hashes but indices has {} flags",
                self.path.len(),
                self.indices.len()
            )));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i > 1) {
            return Err(MerkleError::MalformedProof(format!(
                "position flag {bad} is not 0 or 1"
            )));
        }
        Ok(())
    }

    /// Recompute the root by replaying the path from `leaf`.
    pub fn replay(&self, hasher: &DualHasher, leaf: &ContentHash) -> Result<ContentHash, MerkleError> {
        let mut current = leaf.clone();
        for (sibling, side) in self.steps()? {
            current = match side {
                Side::Left => hasher.combine(sibling, &current),
                Side::Right => hasher.combine(&current, sibling),
            };
        }
        Ok(current)
    }
}

/// Build the full tree over `items`.
pub fn build_tree<T: Serialize>(items: &[T]) -> Result<MerkleTree, MerkleError> {
    MerkleTree::build(items)
}

/// Root hash over `items`; the canonical empty root for an empty list.
pub fn merkle_root<T: Serialize>(items: &[T]) -> Result<ContentHash, MerkleError> {
    Ok(MerkleTree::build(items)?.root)
}

/// Inclusion proof for `item` within `items`.
///
/// Items with identical canonical encodings share one leaf; the proof is
/// for the first of them.
pub fn prove<T: Serialize>(item: &T, items: &[T]) -> Result<Proof, MerkleError> {
    let hasher = DualHasher::default();
    let tree = MerkleTree::build_with(&hasher, items)?;
    tree.prove_leaf(&hasher.hash_json(item)?)
}

/// Check that `proof` places `item` under `expected_root`.
///
/// A mismatched item, path, or root is `Ok(false)`. Only a proof whose
/// shape is inconsistent (or an item that cannot be encoded) is an error.
pub fn verify<T: Serialize + ?Sized>(
    item: &T,
    proof: &Proof,
    expected_root: &ContentHash,
) -> Result<bool, MerkleError> {
    proof.check_shape()?;
    let hasher = DualHasher::default();
    let leaf = hasher.hash_json(item)?;
    if leaf != proof.item_hash {
        return Ok(false);
    }
    Ok(proof.replay(&hasher, &leaf)? == *expected_root)
}

/// Errors from Merkle operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error(transparent)]
    Hasher(#[from] HasherError),

    #[error("item {item_hash:?} is not a leaf of the tree")]
    ItemNotFound { item_hash: ContentHash },

    #[error("malformed proof: {0}")]
    MalformedProof(String),
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use super::*;
    use crate::hasher::dual_hash;

    fn items(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "i": i })).collect()
    }

    fn leaf(item: &Value) -> ContentHash {
        DualHasher::default().hash_json(item).unwrap()
    }

    #[test]
    fn empty_tree_has_canonical_root() {
        let tree = build_tree::<Value>(&[]).unwrap();
        assert_eq!(*tree.root(), dual_hash("empty"));
        assert!(tree.is_empty());
        assert!(tree.levels().is_empty());
        assert_eq!(merkle_root::<Value>(&[]).unwrap(), dual_hash("empty"));
    }

    #[test]
    fn single_leaf_is_root_with_trivial_proof() {
        let list = items(1);
        let tree = build_tree(&list).unwrap();
        assert_eq!(*tree.root(), leaf(&list[0]));

        let proof = prove(&list[0], &list).unwrap();
        assert!(proof.path.is_empty());
        assert!(proof.indices.is_empty());
        assert!(verify(&list[0], &proof, tree.root()).unwrap());
    }

    #[test]
    fn three_items_pair_the_trailing_leaf_with_itself() {
        let list = vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})];
        let hasher = DualHasher::default();
        let (l0, l1, l2) = (leaf(&list[0]), leaf(&list[1]), leaf(&list[2]));

        let expected = hasher.combine(&hasher.combine(&l0, &l1), &hasher.combine(&l2, &l2));
        assert_eq!(merkle_root(&list).unwrap(), expected);

        let padded = MerkleTree::from_leaves(&hasher, vec![l0, l1, l2.clone(), l2]);
        assert_eq!(*padded.root(), expected);
    }

    #[test]
    fn levels_are_unpadded() {
        let tree = build_tree(&items(5)).unwrap();
        let widths: Vec<usize> = tree.levels().iter().map(Vec::len).collect();
        assert_eq!(widths, vec![5, 3, 2, 1]);
    }

    #[test]
    fn proof_verifies_for_all_leaves() {
        for n in 1..=9 {
            let list = items(n);
            let root = merkle_root(&list).unwrap();
            for item in &list {
                let proof = prove(item, &list).unwrap();
                assert_eq!(proof.root, root);
                assert!(verify(item, &proof, &root).unwrap(), "n={n} item={item}");
            }
        }
    }

    #[test]
    fn power_of_two_path_length() {
        let tree = build_tree(&items(8)).unwrap();
        for i in 0..8 {
            let proof = tree.proof(i).unwrap();
            assert_eq!(proof.path.len(), 3);
        }
    }

    #[test]
    fn position_flags_follow_index_parity() {
        let tree = build_tree(&items(8)).unwrap();
        let proof = tree.proof(3).unwrap();
        // 3 = 0b011: right child, right child, left child.
        assert_eq!(proof.indices, vec![1, 1, 0]);
    }

    #[test]
    fn item_not_in_tree() {
        let list = items(4);
        let err = prove(&json!({"x": 999}), &list).unwrap_err();
        assert!(matches!(err, MerkleError::ItemNotFound { .. }));
    }

    #[test]
    fn proof_out_of_bounds_returns_none() {
        let tree = build_tree(&items(2)).unwrap();
        assert!(tree.proof(5).is_none());
    }

    #[test]
    fn replaced_item_fails_verification() {
        let mut list = items(8);
        let root = merkle_root(&list).unwrap();
        let proof = prove(&list[3], &list).unwrap();
        list[3] = json!({"x": 999});
        assert!(!verify(&list[3], &proof, &root).unwrap());
    }

    #[test]
    fn tampered_path_or_root_fails_verification() {
        let list = items(6);
        let root = merkle_root(&list).unwrap();
        let proof = prove(&list[4], &list).unwrap();

        for i in 0..proof.path.len() {
            let mut tampered = proof.clone();
            tampered.path[i] = dual_hash(b"forged");
            assert!(!verify(&list[4], &tampered, &root).unwrap());
        }

        let mut flipped = proof.clone();
        flipped.indices[0] ^= 1;
        assert!(!verify(&list[4], &flipped, &root).unwrap());

        assert!(!verify(&list[4], &proof, &dual_hash(b"wrong root")).unwrap());
    }

    #[test]
    fn malformed_shape_is_an_error() {
        let list = items(4);
        let root = merkle_root(&list).unwrap();
        let mut proof = prove(&list[0], &list).unwrap();
        proof.indices.pop();
        assert!(matches!(
            verify(&list[0], &proof, &root),
            Err(MerkleError::MalformedProof(_))
        ));

        let mut proof = prove(&list[0], &list).unwrap();
        proof.indices[0] = 7;
        assert!(matches!(
            verify(&list[0], &proof, &root),
            Err(MerkleError::MalformedProof(_))
        ));
    }

    #[test]
    fn proof_from_wire_json() {
        let list = items(5);
        let proof = prove(&list[2], &list).unwrap();
        let wire = serde_json::to_value(&proof).unwrap();
        assert_eq!(Proof::from_value(wire).unwrap(), proof);

        let missing = json!({"item_hash": proof.item_hash, "path": [], "root": proof.root});
        assert!(matches!(
            Proof::from_value(missing),
            Err(MerkleError::MalformedProof(_))
        ));
    }

    #[test]
    fn field_order_does_not_change_leaves() {
        let a: Value = serde_json::from_str(r#"{"k":1,"z":[1,{"b":2,"a":1}]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"z":[1,{"a":1,"b":2}],"k":1}"#).unwrap();
        assert_eq!(merkle_root(&[a]).unwrap(), merkle_root(&[b]).unwrap());
    }

    proptest! {
        #[test]
        fn round_trip_proof(values in proptest::collection::vec(any::<u32>(), 1..40), pick in any::<prop::sample::Index>()) {
            let list: Vec<Value> = values.iter().map(|v| json!({ "v": v })).collect();
            let root = merkle_root(&list).unwrap();
            let item = &list[pick.index(list.len())];
            let proof = prove(item, &list).unwrap();
            prop_assert!(verify(item, &proof, &root).unwrap());
        }

        #[test]
        fn swapping_distinct_items_changes_root(
            values in proptest::collection::hash_set(any::<u32>(), 2..20),
            a in any::<prop::sample::Index>(),
            b in any::<prop::sample::Index>(),
        ) {
            let list: Vec<u32> = values.into_iter().collect();
            let (i, j) = (a.index(list.len()), b.index(list.len()));
            prop_assume!(i != j);
            let mut swapped = list.clone();
            swapped.swap(i, j);
            prop_assert_ne!(merkle_root(&list).unwrap(), merkle_root(&swapped).unwrap());
        }
    }
}
