use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tally_crypto::{MerkleError, MerkleTree, Proof};
use tally_store::ReceiptLog;
use tally_types::{AnchorRecord, AnomalyRecord, ContentHash, Receipt, ReceiptBody};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Ledger, SYSTEM_TENANT};

pub const ANCHOR_STAGE: &str = "anchor";
pub const VERIFY_STAGE: &str = "verify";

/// Result of anchoring a batch.
#[derive(Clone, Debug)]
pub struct AnchorOutcome {
    /// The persisted anchor receipt.
    pub receipt: Receipt,
    pub record: AnchorRecord,
    pub elapsed: Duration,
    /// `max(floor, batch_size * per_item)` for this batch.
    pub budget: Duration,
    /// Degradation anomaly appended when the budget was missed.
    pub anomaly: Option<Receipt>,
}

impl AnchorOutcome {
    pub fn degraded(&self) -> bool {
        self.anomaly.is_some()
    }

    pub fn merkle_root(&self) -> &ContentHash {
        &self.record.merkle_root
    }
}

impl<S: ReceiptLog> Ledger<S> {
    /// Publish the Merkle root of `receipts` as an anchor receipt.
    ///
    /// Missing the latency budget does not fail the call: the anchor is
    /// still persisted and returned, with a degradation anomaly next to it.
    pub fn anchor_batch(&self, receipts: &[Receipt], tenant_id: &str) -> LedgerResult<AnchorOutcome> {
        let started = Instant::now();

        let tree = MerkleTree::build_with(&self.hasher, receipts)?;
        let record = AnchorRecord {
            merkle_root: tree.root().clone(),
            batch_size: receipts.len() as u64,
            hash_algorithms: self.hasher.algorithms().map(String::from).to_vec(),
        };
        let receipt = self.emit(tenant_id, ReceiptBody::Anchor(record.clone()))?;

        let elapsed = started.elapsed();
        let budget = self.slo.anchor_budget(receipts.len());
        let anomaly = if elapsed >= budget {
            let degradation = AnomalyRecord::degradation(
                ANCHOR_STAGE,
                "anchor_latency_ms",
                budget.as_secs_f64() * 1e3,
                elapsed.as_secs_f64() * 1e3,
            );
            Some(self.degrade(tenant_id, degradation)?)
        } else {
            None
        };

        debug!(
            tenant_id,
            batch_size = receipts.len(),
            merkle_root = %record.merkle_root.short_hex(),
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "batch anchored"
        );

        Ok(AnchorOutcome {
            receipt,
            record,
            elapsed,
            budget,
            anomaly,
        })
    }

    /// Inclusion proof for `item` within an anchored batch.
    pub fn generate_proof<T: Serialize>(&self, item: &T, receipts: &[T]) -> LedgerResult<Proof> {
        let tree = MerkleTree::build_with(&self.hasher, receipts)?;
        Ok(tree.prove_leaf(&self.hasher.hash_json(item)?)?)
    }

    /// Check `proof` places `item` under `root`.
    ///
    /// A mismatch is `Ok(false)`. A proof with an inconsistent shape is a
    /// stop rule, as is a verification slower than the configured ceiling.
    pub fn verify_proof<T: Serialize + ?Sized>(
        &self,
        item: &T,
        proof: &Proof,
        root: &ContentHash,
    ) -> LedgerResult<bool> {
        let started = Instant::now();

        let leaf = self.hasher.hash_json(item)?;
        if leaf != proof.item_hash {
            proof.check_shape().map_err(|e| self.malformed_proof(e))?;
            return Ok(false);
        }
        let computed = proof
            .replay(&self.hasher, &leaf)
            .map_err(|e| self.malformed_proof(e))?;

        let elapsed = started.elapsed();
        let ceiling = self.slo.verify_ceiling();
        if elapsed >= ceiling {
            let observed_ms = elapsed.as_secs_f64() * 1e3;
            let ceiling_ms = ceiling.as_secs_f64() * 1e3;
            let anomaly = AnomalyRecord::violation(
                "verify_latency",
                VERIFY_STAGE,
                format!("proof verification took {observed_ms:.3}ms, ceiling {ceiling_ms:.0}ms"),
            )
            .with_metric("verify_latency_ms", ceiling_ms, observed_ms);
            return Err(self.stop(SYSTEM_TENANT, anomaly));
        }

        Ok(computed == *root)
    }

    /// [`Ledger::verify_proof`] for a proof received as raw JSON.
    ///
    /// Missing or mistyped proof fields are a stop rule.
    pub fn verify_proof_value<T: Serialize + ?Sized>(
        &self,
        item: &T,
        proof: Value,
        root: &ContentHash,
    ) -> LedgerResult<bool> {
        let proof = Proof::from_value(proof).map_err(|e| self.malformed_proof(e))?;
        self.verify_proof(item, &proof, root)
    }

    fn malformed_proof(&self, err: MerkleError) -> LedgerError {
        let anomaly = AnomalyRecord::violation("malformed_proof", VERIFY_STAGE, err.to_string());
        self.stop(SYSTEM_TENANT, anomaly)
    }
}
