use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_crypto::HashMode;
use tally_store::SyncMode;

use crate::error::{LedgerError, LedgerResult};

/// Ledger configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path of the JSONL receipt log.
    pub path: PathBuf,
    pub sync_mode: SyncMode,
    /// Requested hash mode. Falls back to primary-only when the build has
    /// no secondary algorithm.
    pub hash_mode: HashMode,
    pub slo: SloConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("receipts.jsonl"),
            sync_mode: SyncMode::default(),
            hash_mode: HashMode::available(),
            slo: SloConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Default configuration with the log at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parse from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        toml::from_str(s).map_err(|e| LedgerError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }
}

/// Latency budgets, checked after the fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SloConfig {
    /// Hard ceiling for a single ingest.
    pub ingest_budget_ms: u64,
    /// Minimum anchor budget regardless of batch size.
    pub anchor_floor_ms: u64,
    /// Anchor allowance per receipt in the batch.
    pub anchor_per_item_us: u64,
    /// Hard ceiling for proof and chain verification.
    pub verify_ceiling_ms: u64,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            ingest_budget_ms: 100,
            anchor_floor_ms: 1_000,
            anchor_per_item_us: 1_000,
            verify_ceiling_ms: 5_000,
        }
    }
}

impl SloConfig {
    pub fn ingest_budget(&self) -> Duration {
        Duration::from_millis(self.ingest_budget_ms)
    }

    /// `max(floor, batch_size * per_item)`.
    pub fn anchor_budget(&self, batch_size: usize) -> Duration {
        let scaled = Duration::from_micros(self.anchor_per_item_us.saturating_mul(batch_size as u64));
        scaled.max(Duration::from_millis(self.anchor_floor_ms))
    }

    pub fn verify_ceiling(&self) -> Duration {
        Duration::from_millis(self.verify_ceiling_ms)
    }
}
