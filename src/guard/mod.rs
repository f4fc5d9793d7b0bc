//! Integrity Guard
//!
//! Process-wide lockout driven by chain verification. A detected violation
//! turns the whole system read-only until an operator resets it, and any
//! doubt about the status locks as well.

pub mod status;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::audit::entry::INTEGRITY_RESET;
use crate::audit::{ChainVerifier, ForensicRecorder, LedgerStore, RecordEvent, Verdict};
use crate::error::{LedgerError, Result};

pub use status::{IntegrityStatus, StatusKind, StatusStore};

#[derive(Clone)]
pub struct IntegrityGuard {
    statuses: StatusStore,
    store: LedgerStore,
    verifier: ChainVerifier,
    forensic: ForensicRecorder,
    check_lock: Arc<Mutex<()>>,
    latched: Arc<AtomicBool>,
    unconfirmed: Arc<AtomicBool>,
}

impl IntegrityGuard {
    pub fn new(store: LedgerStore) -> Self {
        Self {
            statuses: StatusStore::new(store.database().clone()),
            verifier: ChainVerifier::new(store.clone()),
            forensic: ForensicRecorder::new(store.clone()),
            store,
            check_lock: Arc::new(Mutex::new(())),
            latched: Arc::new(AtomicBool::new(false)),
            unconfirmed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a guard and latch any violation already persisted
    pub async fn load(store: LedgerStore) -> Result<Self> {
        let guard = Self::new(store);
        let current = guard.statuses.load().await?;
        if current.status == StatusKind::Violated {
            warn!(
                "Integrity guard starting in VIOLATED state (sequence {:?})",
                current.violated_entry_sequence
            );
            guard.latched.store(true, Ordering::SeqCst);
        }
        Ok(guard)
    }

    /// Verify the chain and update the status. Concurrent callers queue
    /// behind the running check.
    pub async fn run_check(&self) -> Result<Verdict> {
        let _running = self.check_lock.lock().await;
        let now = Utc::now();

        let verdict = match self.verifier.verify().await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("Integrity check could not complete: {}", e);
                self.unconfirmed.store(true, Ordering::SeqCst);
                if let Err(mark_err) = self.statuses.record_failed_check(now).await {
                    warn!("Failed to mark integrity status UNKNOWN: {}", mark_err);
                }
                return Err(e);
            }
        };

        match verdict.broken_at() {
            None => {
                if let Err(e) = self.statuses.record_valid_check(now).await {
                    self.unconfirmed.store(true, Ordering::SeqCst);
                    return Err(e);
                }
                self.unconfirmed.store(false, Ordering::SeqCst);
                if self.latched.load(Ordering::SeqCst) {
                    warn!("Chain verifies clean but the guard stays VIOLATED until reset");
                }
            }
            Some((at_sequence, kind)) => {
                self.latched.store(true, Ordering::SeqCst);
                let previous = self.statuses.load().await.ok();
                let reason = verdict.summary();
                let already_recorded = previous.map_or(false, |p| {
                    p.status == StatusKind::Violated
                        && p.violated_entry_sequence == Some(at_sequence)
                        && p.reason.as_deref() == Some(reason.as_str())
                });

                // Evidence is written even when the status update fails
                let recorded = if already_recorded {
                    warn!("Integrity still VIOLATED at sequence {} ({})", at_sequence, kind);
                    Ok(())
                } else {
                    error!(
                        "Integrity VIOLATED at sequence {} ({}), system is now read-only",
                        at_sequence, kind
                    );
                    self.forensic.record_violation(&verdict, now).await.map(|_| ())
                };
                let marked = self.statuses.mark_violated(now, at_sequence, &reason).await;
                if let Err(e) = &marked {
                    error!("Failed to persist VIOLATED status: {}", e);
                }
                recorded?;
                marked?;
            }
        }

        Ok(verdict)
    }

    /// Whether mutations must be refused. Never errors: anything short of
    /// a confirmed OK locks.
    pub async fn is_locked(&self) -> bool {
        if self.latched.load(Ordering::SeqCst) || self.unconfirmed.load(Ordering::SeqCst) {
            return true;
        }
        match self.statuses.load().await {
            Ok(current) => current.status != StatusKind::Ok,
            Err(e) => {
                error!("Integrity status unreadable, failing closed: {}", e);
                true
            }
        }
    }

    pub async fn status(&self) -> Result<IntegrityStatus> {
        self.statuses.load().await
    }

    /// Clear a violation. The reset itself becomes a chain entry.
    pub async fn admin_reset(&self, operator: &str, note: &str) -> Result<i64> {
        let _running = self.check_lock.lock().await;
        let current = self.statuses.load().await?;
        if current.status != StatusKind::Violated {
            return Err(LedgerError::InvalidState(format!(
                "Integrity guard is {}, nothing to reset",
                current.status
            )));
        }

        let mut event = RecordEvent::new(operator, "admin", INTEGRITY_RESET, "integrity_status")
            .payloads(
                Some(serde_json::to_value(&current)?),
                Some(json!({ "status": StatusKind::Ok, "note": note })),
            )
            .via("/admin/audit/reset", "POST");
        if let Some(sequence) = current.violated_entry_sequence {
            event = event.resource_id(sequence.to_string());
        }
        let sequence = self.store.append(event.into_pending()).await?;

        self.statuses.reset(Utc::now()).await?;
        self.latched.store(false, Ordering::SeqCst);
        info!(
            "Integrity guard reset by {} (ledger entry #{}): {}",
            operator, sequence, note
        );
        Ok(sequence)
    }
}
