use std::time::Instant;

use tally_store::ReceiptLog;
use tally_types::{AnomalyRecord, Receipt, ReceiptBody, VerifyRecord};
use tracing::{debug, warn};

use crate::anchor::VERIFY_STAGE;
use crate::error::LedgerResult;
use crate::ledger::Ledger;

impl<S: ReceiptLog> Ledger<S> {
    /// Check every receipt in `receipts` carries a well-formed payload hash.
    ///
    /// Appends and returns a `verify` receipt. A malformed chain is reported
    /// through `verified == false`, never as an error. A scan slower than the
    /// verify ceiling is a stop rule and appends no `verify` receipt.
    pub fn verify_chain(&self, receipts: &[Receipt], tenant_id: &str) -> LedgerResult<Receipt> {
        let started = Instant::now();

        let invalid_hashes: Vec<_> = receipts
            .iter()
            .filter(|r| !r.payload_hash.is_well_formed())
            .map(|r| r.payload_hash.clone())
            .collect();

        let record = VerifyRecord {
            verified: invalid_hashes.is_empty(),
            proof_valid: invalid_hashes.is_empty(),
            chain_length: receipts.len() as u64,
            invalid_hashes,
        };

        let elapsed = started.elapsed();
        let ceiling = self.slo.verify_ceiling();
        if elapsed >= ceiling {
            let observed_ms = elapsed.as_secs_f64() * 1e3;
            let ceiling_ms = ceiling.as_secs_f64() * 1e3;
            let anomaly = AnomalyRecord::violation(
                "verify_latency",
                VERIFY_STAGE,
                format!(
                    "chain verification of {} receipts took {observed_ms:.3}ms, ceiling {ceiling_ms:.0}ms",
                    record.chain_length
                ),
            )
            .with_metric("verify_latency_ms", ceiling_ms, observed_ms);
            return Err(self.stop(tenant_id, anomaly));
        }

        if record.verified {
            debug!(tenant_id, chain_length = record.chain_length, "chain verified");
        } else {
            warn!(
                tenant_id,
                chain_length = record.chain_length,
                invalid = record.invalid_hashes.len(),
                "chain has malformed payload hashes"
            );
        }
        self.emit(tenant_id, ReceiptBody::Verify(record))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tally_types::Classification;

    use crate::config::SloConfig;
    use crate::ledger::tests::{memory_ledger, memory_ledger_with};

    #[test]
    fn well_formed_chain_verifies() {
        let ledger = memory_ledger();
        let chain = ledger.batch_ingest(&["a", "b", "c"], "t1", "api").unwrap();

        let receipt = ledger.verify_chain(&chain, "t1").unwrap();
        let record = receipt.as_verify().unwrap();
        assert!(record.verified);
        assert!(record.proof_valid);
        assert_eq!(record.chain_length, 3);
        assert!(record.invalid_hashes.is_empty());
        assert_eq!(ledger.read_all().unwrap().last(), Some(&receipt));
    }

    #[test]
    fn empty_chain_verifies() {
        let ledger = memory_ledger();
        let record = ledger.verify_chain(&[], "t1").unwrap();
        assert_eq!(record.as_verify().unwrap().chain_length, 0);
        assert!(record.as_verify().unwrap().verified);
    }

    #[test]
    fn malformed_hash_is_reported_not_raised() {
        let ledger = memory_ledger();
        ledger.ingest(b"fine", "t1", "api").unwrap();
        ledger
            .store()
            .push_raw(json!({
                "receipt_type": "ingest",
                "ts": "2024-01-01T00:00:00Z",
                "tenant_id": "t1",
                "payload_hash": "not-a-hash",
            }))
            .unwrap();
        let chain = ledger.read_all().unwrap();

        let receipt = ledger.verify_chain(&chain, "t1").unwrap();
        let record = receipt.as_verify().unwrap();
        assert!(!record.verified);
        assert!(!record.proof_valid);
        assert_eq!(record.chain_length, 2);
        assert_eq!(record.invalid_hashes.len(), 1);
        assert_eq!(record.invalid_hashes[0].as_str(), "not-a-hash");
    }

    #[test]
    fn slow_chain_verification_is_a_stop_rule() {
        let ledger = memory_ledger_with(SloConfig {
            verify_ceiling_ms: 0,
            ingest_budget_ms: 10_000,
            ..SloConfig::default()
        });
        let chain = ledger.batch_ingest(&["a", "b"], "t1", "api").unwrap();

        let err = ledger.verify_chain(&chain, "t1").unwrap_err();
        assert!(err.is_stop());

        let receipts = ledger.read_all().unwrap();
        assert_eq!(receipts.len(), 3);
        assert!(receipts.iter().all(|r| r.as_verify().is_none()));
        let last = &receipts[2];
        assert_eq!(last.tenant_id, "t1");
        let anomaly = last.as_anomaly().unwrap();
        assert_eq!(anomaly.anomaly_type, "verify_latency");
        assert_eq!(anomaly.stage, "verify");
        assert_eq!(anomaly.classification, Classification::Violation);
        assert_eq!(anomaly.metric.as_deref(), Some("verify_latency_ms"));
    }
}
