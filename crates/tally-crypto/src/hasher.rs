use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tally_types::ContentHash;

use crate::canonical::canonical_bytes;

/// Which digests fill the two halves of a [`ContentHash`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashMode {
    /// `sha256:blake3`.
    Dual,
    /// `sha256:sha256`. Same format, but the halves are not independent.
    PrimaryOnly,
}

impl HashMode {
    /// The strongest mode this build supports.
    pub const fn available() -> Self {
        if cfg!(feature = "blake3") {
            Self::Dual
        } else {
            Self::PrimaryOnly
        }
    }

    /// Algorithm names for the primary and secondary halves.
    pub const fn algorithms(self) -> [&'static str; 2] {
        match self {
            Self::Dual => ["SHA256", "BLAKE3"],
            Self::PrimaryOnly => ["SHA256", "SHA256"],
        }
    }
}

impl Default for HashMode {
    fn default() -> Self {
        Self::available()
    }
}

/// SHA-256 + BLAKE3 content hasher.
///
/// Used both to identify payloads and as the Merkle node-combining
/// function. Hashing is total: every byte string, including the empty one,
/// yields a well-formed `"<64-hex>:<64-hex>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DualHasher {
    mode: HashMode,
}

impl DualHasher {
    /// Create a hasher in the requested mode.
    ///
    /// Requesting [`HashMode::Dual`] from a build without the secondary
    /// algorithm yields a [`HashMode::PrimaryOnly`] hasher; check
    /// [`DualHasher::mode`] when it matters.
    pub const fn new(mode: HashMode) -> Self {
        let mode = match (mode, HashMode::available()) {
            (HashMode::Dual, HashMode::PrimaryOnly) => HashMode::PrimaryOnly,
            (requested, _) => requested,
        };
        Self { mode }
    }

    /// The mode this hasher actually runs in.
    pub fn mode(&self) -> HashMode {
        self.mode
    }

    pub fn algorithms(&self) -> [&'static str; 2] {
        self.mode.algorithms()
    }

    /// Hash raw bytes.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let primary: [u8; 32] = Sha256::digest(data).into();
        let secondary = match self.mode {
            HashMode::Dual => secondary_digest(data).unwrap_or(primary),
            HashMode::PrimaryOnly => primary,
        };
        ContentHash::from_digests(&primary, &secondary)
    }

    /// Hash the canonical JSON encoding of a value.
    pub fn hash_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<ContentHash, HasherError> {
        Ok(self.hash(&canonical_bytes(value)?))
    }

    /// Combine two node hashes: the hash of their concatenated string forms.
    pub fn combine(&self, left: &ContentHash, right: &ContentHash) -> ContentHash {
        let mut joined = String::with_capacity(left.as_str().len() + right.as_str().len());
        joined.push_str(left.as_str());
        joined.push_str(right.as_str());
        self.hash(joined.as_bytes())
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }
}

impl Default for DualHasher {
    fn default() -> Self {
        Self::new(HashMode::available())
    }
}

/// Hash bytes with the strongest available mode.
pub fn dual_hash(data: impl AsRef<[u8]>) -> ContentHash {
    DualHasher::default().hash(data.as_ref())
}

#[cfg(feature = "blake3")]
fn secondary_digest(data: &[u8]) -> Option<[u8; 32]> {
    Some(*blake3::hash(data).as_bytes())
}

#[cfg(not(feature = "blake3"))]
fn secondary_digest(_data: &[u8]) -> Option<[u8; 32]> {
    None
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
