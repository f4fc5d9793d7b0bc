//! Forensic Evidence
//!
//! Records detected violations as out-of-chain ledger entries. The evidence
//! does not depend on the chain it describes being trustworthy.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::error;

use crate::audit::entry::{LedgerEntry, RecordEvent, AUDIT_VIOLATION};
use crate::audit::store::LedgerStore;
use crate::audit::verify::Verdict;
use crate::error::{LedgerError, Result};

pub const SYSTEM_ACTOR: &str = "system";

#[derive(Clone)]
pub struct ForensicRecorder {
    store: LedgerStore,
}

impl ForensicRecorder {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Write one evidence entry for a broken verdict
    pub async fn record_violation(&self, verdict: &Verdict, detected_at: DateTime<Utc>) -> Result<i64> {
        let (at_sequence, kind) = verdict.broken_at().ok_or_else(|| {
            LedgerError::InvalidState("Forensic evidence requires a broken verdict".to_string())
        })?;

        let evidence = json!({
            "detected_at": detected_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            "verdict": verdict,
        });

        let pending = RecordEvent::new(SYSTEM_ACTOR, SYSTEM_ACTOR, AUDIT_VIOLATION, "audit_chain")
            .resource_id(at_sequence.to_string())
            .payloads(None, Some(evidence))
            .via("integrity_guard", "VERIFY")
            .into_pending();

        let sequence = self.store.append_out_of_chain(pending).await?;
        error!(
            "Recorded forensic evidence #{} for {} at sequence {}",
            sequence, kind, at_sequence
        );
        Ok(sequence)
    }

    /// Newest evidence entry, if any violation was ever recorded
    pub async fn latest_forensic_record(&self) -> Result<Option<LedgerEntry>> {
        self.store.latest_by_action(AUDIT_VIOLATION).await
    }
}
