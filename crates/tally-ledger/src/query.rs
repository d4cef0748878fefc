use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tally_store::ReceiptLog;
use tally_types::{ContentHash, Receipt};

use crate::error::LedgerResult;
use crate::ledger::Ledger;

/// Default bound on how many ancestors [`Ledger::trace_lineage`] follows.
pub const DEFAULT_LINEAGE_DEPTH: usize = 100;

/// Field a receipt uses to name the receipt it was derived from.
pub const PARENT_FIELD: &str = "parent_hash";

/// Conjunctive receipt filter. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReceiptQuery {
    pub receipt_type: Option<String>,
    pub tenant_id: Option<String>,
    /// Only receipts at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl ReceiptQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipt_type(mut self, receipt_type: impl Into<String>) -> Self {
        self.receipt_type = Some(receipt_type.into());
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn matches(&self, receipt: &Receipt) -> bool {
        if let Some(receipt_type) = &self.receipt_type {
            if receipt.receipt_type() != receipt_type.as_str() {
                return false;
            }
        }
        if let Some(tenant_id) = &self.tenant_id {
            if receipt.tenant_id != *tenant_id {
                return false;
            }
        }
        if let Some(since) = &self.since {
            if !receipt.ts.is_at_or_after(since) {
                return false;
            }
        }
        true
    }
}

impl<S: ReceiptLog> Ledger<S> {
    /// Receipts matching `query`, in log order.
    pub fn query_receipts(&self, query: &ReceiptQuery) -> LedgerResult<Vec<Receipt>> {
        self.query(|receipt| query.matches(receipt))
    }

    /// The receipt with `payload_hash` and its ancestors, oldest first.
    ///
    /// Follows each receipt's `parent_hash` field for at most `max_depth`
    /// steps. Stops early at a missing parent or a cycle. Empty when no
    /// receipt has `payload_hash`.
    pub fn trace_lineage(
        &self,
        payload_hash: &ContentHash,
        max_depth: usize,
    ) -> LedgerResult<Vec<Receipt>> {
        let receipts = self.read_all()?;

        let mut by_hash: HashMap<&ContentHash, &Receipt> = HashMap::new();
        for receipt in &receipts {
            by_hash.entry(&receipt.payload_hash).or_insert(receipt);
        }

        let Some(mut current) = by_hash.get(payload_hash).copied() else {
            return Ok(Vec::new());
        };
        let mut chain = vec![current.clone()];

        for _ in 0..max_depth {
            let Some(parent) = parent_hash(current).and_then(|h| by_hash.get(&h).copied()) else {
                break;
            };
            if chain.iter().any(|r| r.payload_hash == parent.payload_hash) {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }

        chain.reverse();
        Ok(chain)
    }
}

fn parent_hash(receipt: &Receipt) -> Option<ContentHash> {
    match receipt.field(PARENT_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(ContentHash::from_raw(s)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tally_crypto::dual_hash;
    use tally_store::InMemoryLog;

    use super::*;
    use crate::ledger::tests::memory_ledger;

    fn push(ledger: &Ledger<InMemoryLog>, id: &str, parent: Option<&str>) {
        let mut line = json!({
            "receipt_type": "decision",
            "ts": "2024-01-01T00:00:00Z",
            "tenant_id": "t1",
            "payload_hash": dual_hash(id).as_str(),
        });
        if let Some(parent) = parent {
            line[PARENT_FIELD] = json!(dual_hash(parent).as_str());
        }
        ledger.store().push_raw(line).unwrap();
    }

    #[test]
    fn filters_combine() {
        let ledger = memory_ledger();
        ledger.ingest(b"a", "t1", "api").unwrap();
        ledger.ingest(b"b", "t2", "api").unwrap();
        ledger.anchor_batch(&[], "t1").unwrap();

        let all_t1 = ledger.query_receipts(&ReceiptQuery::new().tenant("t1")).unwrap();
        assert_eq!(all_t1.len(), 2);

        let ingests_t1 = ledger
            .query_receipts(&ReceiptQuery::new().tenant("t1").receipt_type("ingest"))
            .unwrap();
        assert_eq!(ingests_t1.len(), 1);
        assert_eq!(ingests_t1[0].payload_hash, dual_hash("a"));

        let everything = ledger.query_receipts(&ReceiptQuery::new()).unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn since_compares_instants_across_representations() {
        let ledger = memory_ledger();
        for ts in [json!("2024-01-01T00:00:00Z"), json!(1_717_200_000), json!("2024-07-01T00:00:00+02:00")] {
            ledger
                .store()
                .push_raw(json!({
                    "receipt_type": "ingest",
                    "ts": ts,
                    "tenant_id": "t1",
                    "payload_hash": dual_hash(ts.to_string()).as_str(),
                }))
                .unwrap();
        }

        let since = "2024-05-01T00:00:00Z".parse().unwrap();
        let recent = ledger
            .query_receipts(&ReceiptQuery::new().since(since))
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn lineage_is_oldest_first() {
        let ledger = memory_ledger();
        push(&ledger, "root", None);
        push(&ledger, "child", Some("root"));
        push(&ledger, "grandchild", Some("child"));

        let chain = ledger
            .trace_lineage(&dual_hash("grandchild"), DEFAULT_LINEAGE_DEPTH)
            .unwrap();
        let ids: Vec<_> = chain.iter().map(|r| r.payload_hash.clone()).collect();
        assert_eq!(
            ids,
            vec![dual_hash("root"), dual_hash("child"), dual_hash("grandchild")]
        );
    }

    #[test]
    fn lineage_respects_depth() {
        let ledger = memory_ledger();
        push(&ledger, "root", None);
        push(&ledger, "child", Some("root"));
        push(&ledger, "grandchild", Some("child"));

        let chain = ledger.trace_lineage(&dual_hash("grandchild"), 1).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].payload_hash, dual_hash("child"));
    }

    #[test]
    fn lineage_stops_at_missing_parent_and_cycles() {
        let ledger = memory_ledger();
        push(&ledger, "orphan", Some("never-written"));
        push(&ledger, "a", Some("b"));
        push(&ledger, "b", Some("a"));

        assert_eq!(
            ledger
                .trace_lineage(&dual_hash("orphan"), DEFAULT_LINEAGE_DEPTH)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            ledger
                .trace_lineage(&dual_hash("a"), DEFAULT_LINEAGE_DEPTH)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn lineage_of_unknown_hash_is_empty() {
        let ledger = memory_ledger();
        assert!(ledger
            .trace_lineage(&dual_hash("nothing"), DEFAULT_LINEAGE_DEPTH)
            .unwrap()
            .is_empty());
    }
}
