//! Compaction: per-type, per-day rollups of old receipts.
//!
//! Source receipts are never removed. Each pass appends one rollup receipt
//! per `(receipt_type, day)` bucket and a compaction receipt describing the
//! pass. Callers must compact strictly increasing, non-overlapping windows;
//! recompacting a window counts its receipts again.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tally_crypto::MerkleTree;
use tally_store::ReceiptLog;
use tally_types::{
    AnomalyRecord, CompactionRecord, Receipt, ReceiptBody, RollupRecord, Span, Tally, Timestamp,
};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;

pub const COMPACTION_STAGE: &str = "compaction";

/// Day bucket for receipts whose timestamp does not resolve.
pub const UNKNOWN_DAY: &str = "unknown";

impl<S: ReceiptLog> Ledger<S> {
    /// Roll up every receipt of `tenant_id` older than `cutoff`.
    ///
    /// With nothing to compact, returns [`CompactionRecord::empty`] and
    /// appends nothing. If the rollups do not account for every input
    /// receipt, nothing but an anomaly is appended and a stop rule is
    /// returned.
    pub fn compact(&self, cutoff: &DateTime<Utc>, tenant_id: &str) -> LedgerResult<CompactionRecord> {
        let receipts = self.query(|r| r.tenant_id == tenant_id && r.ts.precedes(cutoff))?;
        if receipts.is_empty() {
            debug!(tenant_id, %cutoff, "nothing to compact");
            return Ok(CompactionRecord::empty());
        }

        let count_before = receipts.len() as u64;
        let merkle_before = MerkleTree::build_with(&self.hasher, &receipts)?.root().clone();

        let mut buckets: BTreeMap<(String, String), Vec<&Receipt>> = BTreeMap::new();
        for receipt in &receipts {
            let day = receipt.ts.day().unwrap_or_else(|| UNKNOWN_DAY.to_owned());
            buckets
                .entry((receipt.receipt_type().into_owned(), day))
                .or_default()
                .push(receipt);
        }

        let mut rollups = Vec::with_capacity(buckets.len());
        for ((source_type, day), members) in buckets {
            rollups.push(RollupRecord {
                source_type,
                day,
                count: members.len() as u64,
                merkle_root: MerkleTree::build_with(&self.hasher, &members)?.root().clone(),
            });
        }

        let sum_after = match check_conservation(count_before, &rollups) {
            Ok(sum) => sum,
            Err(reason) => {
                let anomaly =
                    AnomalyRecord::violation("compaction_conservation", COMPACTION_STAGE, reason);
                return Err(self.stop(tenant_id, anomaly));
            }
        };

        let rollup_receipts = rollups
            .into_iter()
            .map(|rollup| {
                let ts = Timestamp::start_of_day(&rollup.day);
                self.seal(ts, tenant_id, ReceiptBody::Rollup(rollup))
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        let merkle_after = MerkleTree::build_with(&self.hasher, &rollup_receipts)?
            .root()
            .clone();

        let record = CompactionRecord {
            input_span: span(receipts.iter().map(|r| &r.ts)),
            output_span: span(rollup_receipts.iter().map(|r| &r.ts)),
            counts: Tally {
                before: count_before,
                after: rollup_receipts.len() as u64,
            },
            sums: Tally {
                before: count_before,
                after: sum_after,
            },
            hash_continuity: true,
            merkle_before: Some(merkle_before),
            merkle_after: Some(merkle_after),
        };

        for rollup in &rollup_receipts {
            self.store.append(rollup)?;
        }
        self.emit(tenant_id, ReceiptBody::Compaction(record.clone()))?;

        debug!(
            tenant_id,
            %cutoff,
            before = record.counts.before,
            after = record.counts.after,
            "ledger compacted"
        );
        Ok(record)
    }

    /// [`verify_invariants`], recording an anomaly when they do not hold.
    pub fn check_compaction(&self, record: &CompactionRecord, tenant_id: &str) -> LedgerResult<bool> {
        match invariant_breach(record) {
            None => Ok(true),
            Some(reason) => Err(self.stop(
                tenant_id,
                AnomalyRecord::violation("compaction_invariant", COMPACTION_STAGE, reason),
            )),
        }
    }
}

/// Check that rollup counts add up to the number of input receipts.
///
/// Returns the sum on success and a description of the mismatch otherwise.
pub fn check_conservation(count_before: u64, rollups: &[RollupRecord]) -> Result<u64, String> {
    let sum: u64 = rollups.iter().map(|r| r.count).sum();
    if sum == count_before {
        Ok(sum)
    } else {
        Err(format!(
            "{count_before} receipts in, {sum} accounted for by rollups"
        ))
    }
}

/// Check a compaction record on its own: `counts.after <= counts.before`
/// and `hash_continuity`.
///
/// Returns `Ok(true)` or a stop rule; no anomaly is recorded.
pub fn verify_invariants(record: &CompactionRecord) -> LedgerResult<bool> {
    match invariant_breach(record) {
        None => Ok(true),
        Some(reason) => Err(LedgerError::StopRule {
            stage: COMPACTION_STAGE.to_owned(),
            reason,
        }),
    }
}

fn invariant_breach(record: &CompactionRecord) -> Option<String> {
    if record.counts.after > record.counts.before {
        return Some(format!(
            "counts.after ({}) exceeds counts.before ({})",
            record.counts.after, record.counts.before
        ));
    }
    if !record.hash_continuity {
        return Some("hash_continuity is false".to_owned());
    }
    None
}

/// Earliest and latest timestamps; unresolvable ones sort first.
fn span<'a>(timestamps: impl Iterator<Item = &'a Timestamp> + Clone) -> Span {
    let start = timestamps.clone().min_by_key(|ts| ts.instant());
    let end = timestamps.max_by_key(|ts| ts.instant());
    Span {
        start: start.cloned().unwrap_or_default(),
        end: end.cloned().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;
    use serde_json::json;
    use tally_crypto::merkle_root;
    use tally_store::InMemoryLog;
    use tally_types::ContentHash;

    use super::*;
    use crate::ledger::tests::memory_ledger;

    fn far_future() -> DateTime<Utc> {
        "9999-12-31T23:59:59Z".parse().unwrap()
    }

    fn push(ledger: &Ledger<InMemoryLog>, receipt_type: &str, ts: serde_json::Value, tenant: &str) {
        ledger
            .store()
            .push_raw(json!({
                "receipt_type": receipt_type,
                "ts": ts,
                "tenant_id": tenant,
                "payload_hash": tally_crypto::dual_hash(ts.to_string()).as_str(),
                "redactions": [],
                "source_type": "test",
            }))
            .unwrap();
    }

    fn rollup(count: u64) -> RollupRecord {
        RollupRecord {
            source_type: "ingest".into(),
            day: "2024-01-01".into(),
            count,
            merkle_root: ContentHash::default(),
        }
    }

    #[test]
    fn buckets_by_type_and_day() {
        let ledger = memory_ledger();
        push(&ledger, "ingest", json!("2024-01-01T10:00:00Z"), "t1");
        push(&ledger, "ingest", json!("2024-01-01T12:00:00Z"), "t1");
        push(&ledger, "ingest", json!("2024-01-02T09:00:00Z"), "t1");
        push(&ledger, "ingest", json!(1_704_103_200.0), "t1"); // 2024-01-01T10:00:00Z
        push(&ledger, "ingest", json!("2024-01-01T10:00:00Z"), "t2");
        let inputs = ledger.query(|r| r.tenant_id == "t1").unwrap();

        let record = ledger.compact(&far_future(), "t1").unwrap();
        assert_eq!(record.counts, Tally { before: 4, after: 2 });
        assert_eq!(record.sums, Tally { before: 4, after: 4 });
        assert!(record.hash_continuity);
        assert_eq!(record.merkle_before, Some(merkle_root(&inputs).unwrap()));
        assert_eq!(record.input_span.start, Timestamp::Iso("2024-01-01T10:00:00Z".into()));
        assert_eq!(record.input_span.end, Timestamp::Iso("2024-01-02T09:00:00Z".into()));
        assert_eq!(record.output_span.start, Timestamp::start_of_day("2024-01-01"));
        assert_eq!(record.output_span.end, Timestamp::start_of_day("2024-01-02"));

        let written = ledger.read_all().unwrap();
        assert_eq!(written.len(), 5 + 3);
        let rollups: Vec<&RollupRecord> = written.iter().filter_map(|r| r.as_rollup()).collect();
        assert_eq!(rollups.len(), 2);
        assert_eq!(rollups[0].day, "2024-01-01");
        assert_eq!(rollups[0].count, 3);
        assert_eq!(rollups[1].day, "2024-01-02");
        assert_eq!(rollups[1].count, 1);
        assert_eq!(written[5].receipt_type(), "ingest_rollup");
        assert_eq!(written[5].ts, Timestamp::start_of_day("2024-01-01"));
        assert_eq!(written[7].as_compaction(), Some(&record));
        assert_eq!(
            record.merkle_after,
            Some(merkle_root(&written[5..7]).unwrap())
        );
    }

    #[test]
    fn only_receipts_before_cutoff() {
        let ledger = memory_ledger();
        push(&ledger, "ingest", json!("2024-01-01T10:00:00Z"), "t1");
        push(&ledger, "ingest", json!("2024-03-01T10:00:00Z"), "t1");

        let cutoff = "2024-02-01T00:00:00Z".parse().unwrap();
        let record = ledger.compact(&cutoff, "t1").unwrap();
        assert_eq!(record.counts.before, 1);
    }

    #[test]
    fn unresolvable_timestamps_roll_into_unknown_day() {
        let ledger = memory_ledger();
        push(&ledger, "ingest", json!("garbled"), "t1");

        let record = ledger.compact(&far_future(), "t1").unwrap();
        assert_eq!(record.counts, Tally { before: 1, after: 1 });
        let rollup = ledger
            .read_all()
            .unwrap()
            .into_iter()
            .find_map(|r| r.as_rollup().cloned())
            .unwrap();
        assert_eq!(rollup.day, UNKNOWN_DAY);
    }

    #[test]
    fn nothing_to_compact_appends_nothing() {
        let ledger = memory_ledger();
        push(&ledger, "ingest", json!("2024-01-01T10:00:00Z"), "other");

        let record = ledger.compact(&far_future(), "t1").unwrap();
        assert_eq!(record, CompactionRecord::empty());
        assert_eq!(ledger.read_all().unwrap().len(), 1);
    }

    #[test]
    fn conservation_holds_for_exact_sum() {
        assert_eq!(check_conservation(5, &[rollup(2), rollup(3)]), Ok(5));
        assert_eq!(check_conservation(0, &[]), Ok(0));
    }

    #[test]
    fn conservation_breach_is_reported() {
        let err = check_conservation(5, &[rollup(2), rollup(2)]).unwrap_err();
        assert!(err.contains("5 receipts in, 4 accounted for"));
    }

    #[test]
    fn verify_invariants_accepts_valid_record() {
        let mut record = CompactionRecord::empty();
        record.counts = Tally { before: 5, after: 2 };
        assert!(verify_invariants(&record).unwrap());
    }

    #[test]
    fn verify_invariants_rejects_growth() {
        let mut record = CompactionRecord::empty();
        record.counts = Tally { before: 5, after: 10 };
        let err = verify_invariants(&record).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::StopRule { ref stage, .. } if stage == COMPACTION_STAGE
        ));
    }

    #[test]
    fn verify_invariants_rejects_broken_continuity() {
        let mut record = CompactionRecord::empty();
        record.hash_continuity = false;
        assert!(verify_invariants(&record).unwrap_err().is_stop());
    }

    #[test]
    fn check_compaction_records_anomaly() {
        let ledger = memory_ledger();
        let mut record = CompactionRecord::empty();
        record.counts = Tally { before: 1, after: 2 };

        assert!(ledger.check_compaction(&record, "t1").unwrap_err().is_stop());
        let receipts = ledger.read_all().unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(
            receipts[0].as_anomaly().unwrap().anomaly_type,
            "compaction_invariant"
        );

        assert!(ledger
            .check_compaction(&CompactionRecord::empty(), "t1")
            .unwrap());
    }

    const KINDS: [&str; 3] = ["ingest", "anchor", "spawn"];

    proptest! {
        #[test]
        fn compaction_conserves_counts(
            lines in proptest::collection::vec(
                (0..KINDS.len(), 0u32..6, 0u32..24, any::<bool>(), 0u8..10),
                0..40,
            ),
        ) {
            let ledger = memory_ledger();
            let cutoff: DateTime<Utc> = "2024-01-04T00:00:00Z".parse().unwrap();

            let mut expected_before = 0u64;
            let mut buckets = BTreeSet::new();
            for &(kind, day, hour, own, garble) in &lines {
                let tenant = if own { "t1" } else { "t2" };
                let day_str = format!("2024-01-{:02}", day + 1);
                let (ts, bucket_day) = if garble == 0 {
                    (json!("garbled"), UNKNOWN_DAY.to_owned())
                } else {
                    (json!(format!("{day_str}T{hour:02}:00:00Z")), day_str)
                };
                push(&ledger, KINDS[kind], ts, tenant);
                if own && (garble == 0 || day < 3) {
                    expected_before += 1;
                    buckets.insert((KINDS[kind], bucket_day));
                }
            }

            let record = ledger.compact(&cutoff, "t1").unwrap();
            prop_assert_eq!(record.counts.before, expected_before);
            prop_assert_eq!(record.counts.after, buckets.len() as u64);
            prop_assert!(record.counts.after <= record.counts.before);
            prop_assert_eq!(record.sums.after, record.counts.before);
            prop_assert!(verify_invariants(&record).unwrap());

            let rolled_up: u64 = ledger
                .read_all()
                .unwrap()
                .iter()
                .filter_map(|r| r.as_rollup())
                .map(|r| r.count)
                .sum();
            prop_assert_eq!(rolled_up, record.counts.before);
        }
    }
}
