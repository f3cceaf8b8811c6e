//! Ordered Merkle commitment over the route table.
//!
//! The tree is built over leaves in manifest order. Odd nodes are promoted
//! to the next level unchanged, never duplicated; the on-chain verifier
//! folds proofs under the same rule, so the two sides agree bit for bit.

use prism_types::{keccak256, Hash32};
use serde::{Deserialize, Serialize};

/// One step of an inclusion proof. `is_right == true` means the supplied
/// sibling is the right child at this step (the running hash is the left).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Hash32,
    pub is_right: bool,
}

/// An ordered binary Merkle tree with all intermediate levels retained.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Builds the tree bottom-up. A zero-leaf tree is the distinguished
    /// empty tree whose root is the all-zero hash.
    pub fn from_leaves(leaves: Vec<Hash32>) -> Self {
        if leaves.is_empty() {
            return Self { levels: vec![] };
        }

        let mut levels = vec![leaves];
        while levels.last().expect("non-empty").len() > 1 {
            let previous = levels.last().expect("non-empty");
            let mut next = Vec::with_capacity(previous.len().div_ceil(2));
            for pair in previous.chunks(2) {
                match pair {
                    [left, right] => next.push(hash_pair(left, right)),
                    // Odd node: promoted unchanged.
                    [single] => next.push(*single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                }
            }
            levels.push(next);
        }

        Self { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// The root commitment. All-zero for the empty tree; equal to the single
    /// leaf for a one-leaf tree.
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .map_or(Hash32::ZERO, |level| level[0])
    }

    pub fn leaves(&self) -> &[Hash32] {
        self.levels.first().map_or(&[], Vec::as_slice)
    }

    /// The inclusion proof for the leaf at `index`, or `None` when out of
    /// bounds. Promoted nodes contribute no step.
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.len() {
            return None;
        }

        let mut steps = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            if sibling < level.len() {
                steps.push(ProofStep {
                    sibling: level[sibling],
                    is_right: sibling > position,
                });
            }
            position /= 2;
        }
        Some(steps)
    }
}

pub fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(left.as_slice());
    preimage[32..].copy_from_slice(right.as_slice());
    keccak256(preimage)
}

/// Folds a proof from `leaf` and compares against `root`.
pub fn verify(leaf: Hash32, proof: &[ProofStep], root: Hash32) -> bool {
    let mut current = leaf;
    for step in proof {
        current = if step.is_right {
            hash_pair(&current, &step.sibling)
        } else {
            hash_pair(&step.sibling, &current)
        };
    }
    current == root
}

/// The on-disk commitment document (`manifests/current.merkle.json`):
/// the root, every leaf in order, and one proof per leaf.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MerkleDocument {
    pub root: Hash32,
    pub leaves: Vec<Hash32>,
    pub proofs: Vec<Vec<ProofStep>>,
    #[serde(default)]
    pub empty: bool,
}

impl MerkleDocument {
    pub fn from_tree(tree: &MerkleTree) -> Self {
        let proofs = (0..tree.len())
            .map(|i| tree.proof(i).expect("index in bounds"))
            .collect();
        Self {
            root: tree.root(),
            leaves: tree.leaves().to_vec(),
            proofs,
            empty: tree.is_empty(),
        }
    }
}
