use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Hex length of each half of a well-formed [`ContentHash`] (32-byte digests).
pub const DIGEST_HEX_LEN: usize = 64;

/// Content identifier built from two independent digests.
///
/// Rendered as `"<primary-hex>:<secondary-hex>"`. Hashes produced by the
/// hasher are always well-formed; hashes read back from a ledger file are
/// accepted as-is so that a malformed line never blocks reading; use
/// [`ContentHash::is_well_formed`] to audit them.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Build a hash from two raw digests.
    pub fn from_digests(primary: &[u8; 32], secondary: &[u8; 32]) -> Self {
        Self(format!("{}:{}", hex::encode(primary), hex::encode(secondary)))
    }

    /// Parse a strictly well-formed hash string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let hash = Self(s.to_owned());
        if hash.is_well_formed() {
            Ok(hash)
        } else {
            Err(TypeError::InvalidHash(s.to_owned()))
        }
    }

    /// Wrap an arbitrary string without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary (SHA-256) half; the whole string if there is no separator.
    pub fn primary(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(p, _)| p)
    }

    /// The secondary half, if a separator is present.
    pub fn secondary(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, s)| s)
    }

    /// Returns `true` if this matches `^[0-9a-f]{64}:[0-9a-f]{64}$`.
    pub fn is_well_formed(&self) -> bool {
        match self.0.split_once(':') {
            Some((primary, secondary)) => is_digest_hex(primary) && is_digest_hex(secondary),
            None => false,
        }
    }

    /// Returns `true` if both halves are identical, which is what the
    /// primary-only hash mode produces.
    pub fn is_degraded(&self) -> bool {
        self.secondary() == Some(self.primary())
    }

    /// First `depth` bits of the primary digest as a string of `'0'`/`'1'`.
    ///
    /// Used by collaborators to place or route items by hash prefix. The
    /// result is shorter than `depth` only if the primary half is.
    pub fn position_bits(&self, depth: usize) -> String {
        self.primary()
            .chars()
            .filter_map(|c| c.to_digit(16))
            .flat_map(|nibble| (0..4).rev().map(move |bit| (nibble >> bit) & 1))
            .take(depth)
            .map(|bit| if bit == 1 { '1' } else { '0' })
            .collect()
    }

    /// First 8 characters of the primary digest.
    pub fn short_hex(&self) -> &str {
        let primary = self.primary();
        primary.get(..8).unwrap_or(primary)
    }
}

fn is_digest_hex(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
