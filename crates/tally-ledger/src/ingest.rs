use std::time::Instant;

use tally_store::ReceiptLog;
use tally_types::{AnomalyRecord, IngestRecord, Receipt, ReceiptBody, Timestamp};
use tracing::debug;

use crate::error::LedgerResult;
use crate::ledger::Ledger;

pub const INGEST_STAGE: &str = "ingest";

impl<S: ReceiptLog> Ledger<S> {
    /// Record that `payload` was received for `tenant_id`.
    ///
    /// The receipt's `payload_hash` is the dual hash of the raw payload
    /// bytes. The ingest must finish under the configured budget; a slower
    /// call is a stop rule. The receipt has already been appended by then.
    pub fn ingest(
        &self,
        payload: &[u8],
        tenant_id: &str,
        source_type: &str,
    ) -> LedgerResult<Receipt> {
        let started = Instant::now();

        let receipt = Receipt::new(
            Timestamp::now(),
            tenant_id,
            self.hasher.hash(payload),
            ReceiptBody::Ingest(IngestRecord {
                redactions: Vec::new(),
                source_type: source_type.to_owned(),
            }),
        );
        self.store.append(&receipt)?;

        let elapsed = started.elapsed();
        let budget = self.slo.ingest_budget();
        if elapsed >= budget {
            let observed_ms = elapsed.as_secs_f64() * 1e3;
            let budget_ms = budget.as_secs_f64() * 1e3;
            let anomaly = AnomalyRecord::violation(
                "ingest_latency",
                INGEST_STAGE,
                format!("ingest took {observed_ms:.3}ms, budget {budget_ms:.0}ms"),
            )
            .with_metric("ingest_latency_ms", budget_ms, observed_ms);
            return Err(self.stop(tenant_id, anomaly));
        }

        debug!(
            tenant_id,
            source_type,
            payload_hash = %receipt.payload_hash.short_hex(),
            elapsed_us = elapsed.as_micros() as u64,
            "payload ingested"
        );
        Ok(receipt)
    }

    /// Ingest each payload in turn.
    ///
    /// Stops at the first failure. Receipts already appended stay in the
    /// ledger; there is no batch rollback.
    pub fn batch_ingest<P: AsRef<[u8]>>(
        &self,
        payloads: &[P],
        tenant_id: &str,
        source_type: &str,
    ) -> LedgerResult<Vec<Receipt>> {
        payloads
            .iter()
            .map(|payload| self.ingest(payload.as_ref(), tenant_id, source_type))
            .collect()
    }
}
