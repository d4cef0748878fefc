use tally_crypto::{HasherError, MerkleError};
use tally_store::StoreError;
use tally_types::TypeError;

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A hard failure. An anomaly receipt describing it was appended before
    /// this was returned; the operation did not complete.
    #[error("stop rule triggered in {stage}: {reason}")]
    StopRule { stage: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error(transparent)]
    Hasher(#[from] HasherError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Returns `true` for hard failures the caller must halt on.
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::StopRule { .. })
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
