//! Append-only receipt storage for the Tally ledger.
//!
//! A ledger is a single file of newline-delimited JSON objects, one receipt
//! per line, keys sorted. It is never truncated or rewritten.
//!
//! # Backends
//!
//! All backends implement the [`ReceiptLog`] trait:
//!
//! - [`FileLog`] -- durable JSONL file, the production backend
//! - [`InMemoryLog`] -- `Vec`-based log for tests and embedding
//!
//! # Design Rules
//!
//! 1. Appends are atomic at line granularity: the whole line is written and
//!    flushed while the writer lock is held.
//! 2. The lock covers only write-and-flush; serialization happens before it.
//! 3. Reads never take the writer lock and never fail on a missing file.
//! 4. Reads are permissive; strictness lives in [`audit`].
//! 5. Write I/O errors are propagated, never silently ignored.

pub mod audit;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use audit::{audit_lines, AuditReport, AuditViolation, ViolationKind};
pub use error::{StoreError, StoreResult};
pub use file::{FileLog, SyncMode};
pub use memory::InMemoryLog;
pub use traits::{RawLine, ReceiptLog};
