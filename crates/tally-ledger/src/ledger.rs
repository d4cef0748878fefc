use tally_crypto::DualHasher;
use tally_store::{AuditReport, FileLog, ReceiptLog};
use tally_types::{AnomalyRecord, Receipt, ReceiptBody, Timestamp};
use tracing::{error, warn};

use crate::config::{LedgerConfig, SloConfig};
use crate::error::{LedgerError, LedgerResult};

/// Tenant recorded on anomalies raised outside any tenant's operation.
pub const SYSTEM_TENANT: &str = "system";

/// The receipt ledger.
///
/// Owns the receipt log and is the single entry point collaborators use:
/// ingest, query, anchor, prove/verify, compact. The services themselves
/// are split across this crate's modules as `impl` blocks on this type.
///
/// Holds no state besides the log, so sharing a `&Ledger` across threads is
/// all the coordination callers need.
pub struct Ledger<S: ReceiptLog = FileLog> {
    pub(crate) store: S,
    pub(crate) hasher: DualHasher,
    pub(crate) slo: SloConfig,
}

impl Ledger<FileLog> {
    /// Open the file-backed ledger described by `config`.
    pub fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let store = FileLog::open(&config.path, config.sync_mode)?;
        Ok(Self::with_store(store, config))
    }
}

impl<S: ReceiptLog> Ledger<S> {
    /// Wrap an existing receipt log.
    pub fn with_store(store: S, config: &LedgerConfig) -> Self {
        let hasher = DualHasher::new(config.hash_mode);
        if hasher.mode() != config.hash_mode {
            warn!(
                requested = ?config.hash_mode,
                active = ?hasher.mode(),
                "requested hash mode unavailable in this build"
            );
        }
        Self {
            store,
            hasher,
            slo: config.slo.clone(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hasher(&self) -> &DualHasher {
        &self.hasher
    }

    pub fn slo(&self) -> &SloConfig {
        &self.slo
    }

    /// Build, hash, and append a receipt stamped with the current time.
    ///
    /// `payload_hash` is computed over the payload fields plus `tenant_id`.
    pub fn emit(&self, tenant_id: &str, body: ReceiptBody) -> LedgerResult<Receipt> {
        let receipt = self.seal(Timestamp::now(), tenant_id, body)?;
        self.store.append(&receipt)?;
        Ok(receipt)
    }

    /// Build and hash a receipt without appending it.
    pub(crate) fn seal(
        &self,
        ts: Timestamp,
        tenant_id: &str,
        body: ReceiptBody,
    ) -> LedgerResult<Receipt> {
        let payload_hash = self
            .hasher
            .hash_json(&Receipt::hashed_fields(tenant_id, &body)?)?;
        Ok(Receipt::new(ts, tenant_id, payload_hash, body))
    }

    /// Every receipt in log order.
    pub fn read_all(&self) -> LedgerResult<Vec<Receipt>> {
        Ok(self.store.read_all()?)
    }

    /// Receipts matching `predicate`, in log order.
    pub fn query(&self, predicate: impl Fn(&Receipt) -> bool) -> LedgerResult<Vec<Receipt>> {
        Ok(self.store.query(&predicate)?)
    }

    /// Compliance audit of every line in the log.
    pub fn audit(&self) -> LedgerResult<AuditReport> {
        Ok(self.store.audit()?)
    }

    /// Record a hard failure and produce the error to return.
    ///
    /// If the anomaly itself cannot be appended, that store error is
    /// returned instead, since the failure was not durably recorded.
    pub(crate) fn stop(&self, tenant_id: &str, anomaly: AnomalyRecord) -> LedgerError {
        let stage = anomaly.stage.clone();
        let reason = anomaly
            .detail
            .clone()
            .unwrap_or_else(|| anomaly.anomaly_type.clone());

        if let Err(e) = self.emit(tenant_id, ReceiptBody::Anomaly(anomaly)) {
            error!(%stage, %reason, tenant_id, error = %e, "stop rule could not be recorded");
            return e;
        }

        error!(%stage, %reason, tenant_id, "stop rule triggered");
        LedgerError::StopRule { stage, reason }
    }

    /// Record a degradation alongside an otherwise successful result.
    pub(crate) fn degrade(&self, tenant_id: &str, anomaly: AnomalyRecord) -> LedgerResult<Receipt> {
        warn!(
            stage = %anomaly.stage,
            metric = anomaly.metric.as_deref().unwrap_or_default(),
            delta = anomaly.delta.unwrap_or_default(),
            tenant_id,
            "service level missed"
        );
        self.emit(tenant_id, ReceiptBody::Anomaly(anomaly))
    }
}
