use serde_json::Value;
use tally_types::{ContentHash, Receipt};
use tracing::warn;

use crate::audit::{audit_lines, AuditReport};
use crate::error::StoreResult;

/// One line of a receipt log as it was read.
#[derive(Clone, Debug, PartialEq)]
pub enum RawLine {
    /// A line that parsed as JSON (not necessarily an object).
    Parsed { number: usize, value: Value },
    /// A line that is not valid JSON.
    Corrupt { number: usize, reason: String },
}

impl RawLine {
    /// 1-based line number within the log.
    pub fn number(&self) -> usize {
        match self {
            Self::Parsed { number, .. } | Self::Corrupt { number, .. } => *number,
        }
    }
}

/// Append-only receipt log.
///
/// All implementations must satisfy these invariants:
/// - A receipt, once appended, is never modified or removed.
/// - Concurrent appends never interleave partial lines.
/// - A reader observes a consistent prefix of the log: it may miss the
///   newest line, but never sees a partial one.
/// - Reading an absent log yields an empty ledger.
pub trait ReceiptLog: Send + Sync {
    /// Append a receipt and return its id (its `payload_hash`).
    ///
    /// Returns `Err` if the line cannot be written and flushed; the record
    /// is never silently dropped.
    fn append(&self, receipt: &Receipt) -> StoreResult<ContentHash>;

    /// Every complete line in append order, without interpretation.
    fn read_raw(&self) -> StoreResult<Vec<RawLine>>;

    /// Every receipt in append order.
    ///
    /// Lines that are not JSON objects are skipped with a warning.
    fn read_all(&self) -> StoreResult<Vec<Receipt>> {
        let mut receipts = Vec::new();
        for line in self.read_raw()? {
            match line {
                RawLine::Parsed { number, value } => match Receipt::from_value(value) {
                    Ok(receipt) => receipts.push(receipt),
                    Err(e) => warn!(line = number, error = %e, "skipping non-receipt line"),
                },
                RawLine::Corrupt { number, reason } => {
                    warn!(line = number, %reason, "skipping corrupt line");
                }
            }
        }
        Ok(receipts)
    }

    /// Receipts matching `predicate`, in append order. Linear scan.
    fn query(&self, predicate: &dyn Fn(&Receipt) -> bool) -> StoreResult<Vec<Receipt>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|receipt| predicate(receipt))
            .collect())
    }

    /// Check every line against the required-field and hash-shape rules.
    fn audit(&self) -> StoreResult<AuditReport> {
        Ok(audit_lines(&self.read_raw()?))
    }
}
