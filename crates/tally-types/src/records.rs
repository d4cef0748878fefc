//! Typed payloads carried by receipts.
//!
//! Each record denies unknown fields so that a line written by a newer or
//! foreign producer falls back to an opaque payload instead of silently
//! losing fields (and therefore changing its Merkle leaf) on read-back.

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::timestamp::Timestamp;

/// A raw payload was accepted for a tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestRecord {
    pub redactions: Vec<String>,
    pub source_type: String,
}

/// A Merkle root published over a frozen batch of receipts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnchorRecord {
    pub merkle_root: ContentHash,
    pub batch_size: u64,
    pub hash_algorithms: Vec<String>,
}

/// First and last timestamps covered by a compaction pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A before/after pair of counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tally {
    pub before: u64,
    pub after: u64,
}

/// One aggregation pass over a slice of the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompactionRecord {
    pub input_span: Span,
    pub output_span: Span,
    pub counts: Tally,
    pub sums: Tally,
    pub hash_continuity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_before: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_after: Option<ContentHash>,
}

impl CompactionRecord {
    /// The record for a pass that found nothing to compact.
    pub fn empty() -> Self {
        Self {
            input_span: Span::default(),
            output_span: Span::default(),
            counts: Tally::default(),
            sums: Tally::default(),
            hash_continuity: true,
            merkle_before: None,
            merkle_after: None,
        }
    }
}

/// Per-type, per-day aggregate produced by compaction.
///
/// Stored with receipt type `"<source_type>_rollup"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollupRecord {
    #[serde(skip)]
    pub source_type: String,
    pub day: String,
    pub count: u64,
    pub merkle_root: ContentHash,
}

/// How serious an anomaly is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Correct result, missed service-level target.
    Degradation,
    /// The operation was aborted.
    Violation,
}

/// What the ledger did about an anomaly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyAction {
    Alert,
    Halt,
}

/// Durable record of a stop rule or a degradation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnomalyRecord {
    pub anomaly_type: String,
    pub stage: String,
    pub classification: Classification,
    pub action: AnomalyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AnomalyRecord {
    /// An aborting anomaly: the operation halted.
    pub fn violation(anomaly_type: &str, stage: &str, detail: impl Into<String>) -> Self {
        Self {
            anomaly_type: anomaly_type.to_owned(),
            stage: stage.to_owned(),
            classification: Classification::Violation,
            action: AnomalyAction::Halt,
            metric: None,
            baseline: None,
            delta: None,
            detail: Some(detail.into()),
        }
    }

    /// A non-aborting anomaly: a latency or similar target was missed.
    pub fn degradation(stage: &str, metric: &str, baseline: f64, observed: f64) -> Self {
        Self {
            anomaly_type: format!("{stage}_degradation"),
            stage: stage.to_owned(),
            classification: Classification::Degradation,
            action: AnomalyAction::Alert,
            metric: Some(metric.to_owned()),
            baseline: Some(baseline),
            delta: Some(observed - baseline),
            detail: None,
        }
    }

    /// Attach a measured metric to a violation.
    pub fn with_metric(mut self, metric: &str, baseline: f64, observed: f64) -> Self {
        self.metric = Some(metric.to_owned());
        self.baseline = Some(baseline);
        self.delta = Some(observed - baseline);
        self
    }
}

/// Outcome of a payload-hash continuity check over a receipt sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyRecord {
    pub verified: bool,
    pub proof_valid: bool,
    pub chain_length: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_hashes: Vec<ContentHash>,
}
