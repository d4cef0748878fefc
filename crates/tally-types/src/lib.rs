//! Foundation types for the Tally receipt ledger.
//!
//! Every other Tally crate depends on `tally-types`. Nothing in this crate
//! performs hashing or I/O; it only defines the shapes that the hashing,
//! storage, and service layers agree on.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- `"<sha256-hex>:<secondary-hex>"` content identifier
//! - [`Timestamp`] -- receipt time, ISO-8601 string or numeric UNIX seconds
//! - [`Receipt`] -- fixed envelope plus a typed [`ReceiptBody`]
//! - [`AnchorRecord`], [`CompactionRecord`], [`RollupRecord`], ... -- payload variants

pub mod error;
pub mod hash;
pub mod receipt;
pub mod records;
pub mod timestamp;

pub use error::TypeError;
pub use hash::ContentHash;
pub use receipt::{Receipt, ReceiptBody, ENVELOPE_FIELDS};
pub use records::{
    AnchorRecord, AnomalyAction, AnomalyRecord, Classification, CompactionRecord, IngestRecord,
    RollupRecord, Span, Tally, VerifyRecord,
};
pub use timestamp::Timestamp;
