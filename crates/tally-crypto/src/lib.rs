//! Cryptographic primitives for the Tally ledger.
//!
//! Provides the SHA-256 + BLAKE3 dual hash, canonical (key-sorted) JSON
//! serialization, and binary Merkle trees with inclusion proofs. Everything
//! here is a pure function of its inputs and needs no synchronization.

pub mod canonical;
pub mod hasher;
pub mod merkle;

pub use canonical::canonical_bytes;
pub use hasher::{dual_hash, DualHasher, HashMode, HasherError};
pub use merkle::{
    build_tree, merkle_root, prove, verify, MerkleError, MerkleTree, Proof, Side,
    EMPTY_TREE_SEED,
};
