use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid content hash {0:?}: expected \"<64-hex>:<64-hex>\"")]
    InvalidHash(String),

    #[error("receipt must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),
}
