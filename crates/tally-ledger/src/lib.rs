//! Ledger services for Tally.
//!
//! [`Ledger`] wraps a [`ReceiptLog`](tally_store::ReceiptLog) and provides
//! the verbs collaborators use:
//! - `ingest` / `batch_ingest` -- record raw payloads
//! - `query` / `query_receipts` / `trace_lineage` -- read the ledger
//! - `anchor_batch` -- publish a Merkle root over a batch
//! - `generate_proof` / `verify_proof` -- inclusion proofs for a batch
//! - `compact` -- per-type, per-day rollups with conservation checks
//! - `verify_chain` -- payload hash sanity over a receipt sequence
//!
//! # Failure kinds
//!
//! A *stop rule* ([`LedgerError::StopRule`]) aborts the operation after an
//! anomaly receipt has been appended: ingest over budget, compaction that
//! loses or double-counts receipts, a malformed proof. A *degradation* is
//! recorded as an anomaly receipt while the operation still returns its
//! result: an anchor over budget. A proof that does not verify is neither;
//! it is `Ok(false)`.

pub mod anchor;
pub mod compact;
pub mod config;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod query;
pub mod verify;

pub use anchor::AnchorOutcome;
pub use compact::{check_conservation, verify_invariants, UNKNOWN_DAY};
pub use config::{LedgerConfig, SloConfig};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, SYSTEM_TENANT};
pub use query::{ReceiptQuery, DEFAULT_LINEAGE_DEPTH};
