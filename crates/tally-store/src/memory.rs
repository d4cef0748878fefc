use std::sync::RwLock;

use serde_json::Value;
use tally_types::{ContentHash, Receipt};

use crate::error::{StoreError, StoreResult};
use crate::traits::{RawLine, ReceiptLog};

/// In-memory receipt log for tests, local demos, and embedding.
///
/// Lines are held as JSON values, exactly what [`crate::FileLog`] would
/// parse back from disk, so both backends read identically.
#[derive(Default)]
pub struct InMemoryLog {
    lines: RwLock<Vec<Value>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arbitrary JSON line, bypassing receipt serialization.
    ///
    /// Lets callers reproduce ledgers written by other producers.
    pub fn push_raw(&self, value: Value) -> StoreResult<()> {
        self.lines
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lines.read().map(|lines| lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReceiptLog for InMemoryLog {
    fn append(&self, receipt: &Receipt) -> StoreResult<ContentHash> {
        let value = receipt.to_value()?;
        self.push_raw(value)?;
        Ok(receipt.payload_hash.clone())
    }

    fn read_raw(&self) -> StoreResult<Vec<RawLine>> {
        let lines = self.lines.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(lines
            .iter()
            .enumerate()
            .map(|(index, value)| RawLine::Parsed {
                number: index + 1,
                value: value.clone(),
            })
            .collect())
    }
}
