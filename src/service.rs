//! Audit ledger facade used by collaborators and the HTTP layer.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::anchor::{AnchorPayload, AnchorPublisher, AnchorReport};
use crate::audit::{
    AuditFilter, ChainVerifier, ForensicRecorder, LedgerEntry, LedgerStore, RecordEvent, Verdict,
};
use crate::config::AppConfig;
use crate::database::Database;
use crate::error::{LedgerError, Result};
use crate::guard::{IntegrityGuard, StatusKind};

/// Integrity status together with the newest forensic record
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub status: StatusKind,
    pub last_check_at: Option<DateTime<Utc>>,
    pub violated_at: Option<DateTime<Utc>>,
    pub violated_entry_sequence: Option<i64>,
    pub reason: Option<String>,
    pub forensic_record: Option<LedgerEntry>,
}

#[derive(Clone)]
pub struct AuditLedger {
    store: LedgerStore,
    verifier: ChainVerifier,
    forensic: ForensicRecorder,
    guard: IntegrityGuard,
    publisher: AnchorPublisher,
}

impl AuditLedger {
    pub fn new(store: LedgerStore, guard: IntegrityGuard, publisher: AnchorPublisher) -> Self {
        Self {
            verifier: ChainVerifier::new(store.clone()),
            forensic: ForensicRecorder::new(store.clone()),
            store,
            guard,
            publisher,
        }
    }

    /// Wire the ledger from configuration over an already migrated database
    pub async fn open(database: Database, config: &AppConfig) -> Result<Self> {
        let store = LedgerStore::new(database);
        let guard = IntegrityGuard::load(store.clone()).await?;
        let publisher = AnchorPublisher::from_config(&config.anchor);
        Ok(Self::new(store, guard, publisher))
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn guard(&self) -> &IntegrityGuard {
        &self.guard
    }

    /// Append one event to the chain. Recording is never refused by the
    /// lockout; collaborators consult `is_locked` before mutating.
    pub async fn record_event(&self, event: RecordEvent) -> Result<i64> {
        self.store.append(event.into_pending()).await
    }

    /// Verify without touching the integrity status
    pub async fn verify_chain(&self) -> Result<Verdict> {
        self.verifier.verify().await
    }

    pub async fn run_check(&self) -> Result<Verdict> {
        self.guard.run_check().await
    }

    /// Run a check and turn a broken verdict into an error. The forensic
    /// record already exists when the error is returned.
    pub async fn ensure_intact(&self) -> Result<usize> {
        match self.guard.run_check().await? {
            Verdict::Valid { checked_count } => Ok(checked_count),
            Verdict::Broken {
                at_sequence, kind, ..
            } => Err(LedgerError::IntegrityViolation { at_sequence, kind }),
        }
    }

    pub async fn is_locked(&self) -> bool {
        self.guard.is_locked().await
    }

    /// Filtered listing of recorded events, newest first
    pub async fn list_events(&self, filter: &AuditFilter) -> Result<Vec<LedgerEntry>> {
        self.store.list(filter).await
    }

    pub async fn get_evidence(&self) -> Result<Evidence> {
        let status = self.guard.status().await?;
        let forensic_record = self.forensic.latest_forensic_record().await?;
        Ok(Evidence {
            status: status.status,
            last_check_at: status.last_check_at,
            violated_at: status.violated_at,
            violated_entry_sequence: status.violated_entry_sequence,
            reason: status.reason,
            forensic_record,
        })
    }

    /// Publish the current head to every configured witness
    pub async fn publish_anchor(&self, operator: &str) -> Result<AnchorReport> {
        let head_fingerprint = self
            .store
            .head_fingerprint()
            .await?
            .ok_or(LedgerError::EmptyChain)?;
        if self.is_locked().await {
            warn!("Anchoring head {} while the system is locked", head_fingerprint);
        }

        let anchor_id = Uuid::new_v4();
        let timestamp = Utc::now();
        let payload = AnchorPayload {
            anchor_id,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            head_fingerprint: head_fingerprint.clone(),
            operator: operator.to_string(),
            chain_length: self.store.count_chain().await?,
        };

        let witnesses = self.publisher.publish(&payload).await;
        let report = AnchorReport {
            anchor_id,
            head_fingerprint,
            timestamp,
            witnesses,
        };
        info!(
            "Anchor {} published by {}: {}/{} witness(es) succeeded",
            report.anchor_id,
            operator,
            report.succeeded(),
            report.witnesses.len()
        );
        Ok(report)
    }

    pub async fn admin_reset(&self, operator: &str, note: &str) -> Result<i64> {
        self.guard.admin_reset(operator, note).await
    }
}
