//! Lockout, forensic evidence and reset

mod common;

use common::*;
use integrity_ledger::audit::entry::{AUDIT_VIOLATION, INTEGRITY_RESET};
use integrity_ledger::audit::{BreakKind, LedgerStore, Verdict};
use integrity_ledger::guard::{IntegrityGuard, StatusKind};
use integrity_ledger::LedgerError;

const ORIGINAL_PAYLOAD: &str = r#"{"id":3,"valor":31}"#;
const FORGED_PAYLOAD: &str = r#"{"id":3,"valor":999}"#;

#[tokio::test]
async fn test_broken_chain_locks_and_records_evidence() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 5).await;
    assert!(!ledger.is_locked().await);

    tamper_column(ledger.store().database(), 3, "payload_after", FORGED_PAYLOAD).await;
    let verdict = ledger.run_check().await.unwrap();
    assert_eq!(verdict.broken_at(), Some((3, BreakKind::FingerprintMismatch)));
    assert!(ledger.is_locked().await);

    let evidence = ledger.get_evidence().await.unwrap();
    assert_eq!(evidence.status, StatusKind::Violated);
    assert_eq!(evidence.violated_entry_sequence, Some(3));
    assert!(evidence.violated_at.is_some());
    assert!(evidence.reason.unwrap().contains("FINGERPRINT_MISMATCH"));

    let record = evidence.forensic_record.expect("forensic record");
    assert_eq!(record.action, AUDIT_VIOLATION);
    assert_eq!(record.actor, "system");
    assert_eq!(record.resource, "audit_chain");
    assert_eq!(record.resource_id.as_deref(), Some("3"));
    assert_eq!(record.fingerprint, None);
    assert_eq!(record.prev_fingerprint, None);
}

#[tokio::test]
async fn test_forensic_entry_is_ignored_by_verification() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 5).await;
    let database = ledger.store().database().clone();

    tamper_column(&database, 3, "payload_after", FORGED_PAYLOAD).await;
    ledger.run_check().await.unwrap();
    tamper_column(&database, 3, "payload_after", ORIGINAL_PAYLOAD).await;

    ledger.record_event(business_event("INSERT", 6)).await.unwrap();
    let all = ledger.store().read_all().await.unwrap();
    assert_eq!(all.len(), 7);
    assert_eq!(all[5].action, AUDIT_VIOLATION);
    assert_eq!(
        ledger.verify_chain().await.unwrap(),
        Verdict::Valid { checked_count: 6 }
    );
}

#[tokio::test]
async fn test_evidence_written_once_per_break() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 4).await;
    let database = ledger.store().database().clone();

    tamper_column(&database, 2, "actor", "mallory").await;
    ledger.run_check().await.unwrap();
    ledger.run_check().await.unwrap();
    assert_eq!(forensic_count(&ledger).await, 1);

    tamper_column(&database, 2, "actor", "alice").await;
    tamper_column(&database, 4, "actor", "mallory").await;
    let verdict = ledger.run_check().await.unwrap();
    assert_eq!(verdict.broken_at(), Some((4, BreakKind::FingerprintMismatch)));
    assert_eq!(forensic_count(&ledger).await, 2);
}

#[tokio::test]
async fn test_violation_is_sticky() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 5).await;
    let database = ledger.store().database().clone();

    tamper_column(&database, 3, "payload_after", FORGED_PAYLOAD).await;
    ledger.run_check().await.unwrap();
    tamper_column(&database, 3, "payload_after", ORIGINAL_PAYLOAD).await;

    let verdict = ledger.run_check().await.unwrap();
    assert!(verdict.is_valid());
    assert!(ledger.is_locked().await);
    assert_eq!(
        ledger.get_evidence().await.unwrap().status,
        StatusKind::Violated
    );
}

#[tokio::test]
async fn test_latched_violation_survives_status_row_edit() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 3).await;
    let database = ledger.store().database().clone();

    tamper_column(&database, 1, "role", "admin").await;
    ledger.run_check().await.unwrap();

    sqlx::query("UPDATE integrity_status SET status = 'OK' WHERE id = 1")
        .execute(database.pool())
        .await
        .unwrap();
    assert!(ledger.is_locked().await);
}

#[tokio::test]
async fn test_unreadable_status_fails_closed() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 2).await;
    ledger.run_check().await.unwrap();
    assert!(!ledger.is_locked().await);

    ledger.store().database().close().await;
    assert!(ledger.is_locked().await);
    assert!(matches!(
        ledger.run_check().await,
        Err(LedgerError::Storage(_))
    ));
}

#[tokio::test]
async fn test_missing_status_row_fails_closed() {
    let ledger = setup_ledger().await;
    sqlx::query("DELETE FROM integrity_status")
        .execute(ledger.store().database().pool())
        .await
        .unwrap();
    assert!(ledger.is_locked().await);
}

#[tokio::test]
async fn test_unchecked_ledger_is_locked() {
    let ledger = setup_unchecked_ledger(Vec::new()).await;
    assert_eq!(ledger.get_evidence().await.unwrap().status, StatusKind::Unknown);
    assert!(ledger.is_locked().await);

    ledger.run_check().await.unwrap();
    assert!(!ledger.is_locked().await);
}

#[tokio::test]
async fn test_check_that_cannot_complete_locks() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 3).await;
    ledger.run_check().await.unwrap();
    assert!(!ledger.is_locked().await);

    sqlx::query("ALTER TABLE ledger_entries RENAME TO ledger_entries_gone")
        .execute(ledger.store().database().pool())
        .await
        .unwrap();
    assert!(matches!(
        ledger.run_check().await,
        Err(LedgerError::Storage(_))
    ));
    assert_eq!(
        ledger.guard().status().await.unwrap().status,
        StatusKind::Unknown
    );
    assert!(ledger.is_locked().await);
}

#[tokio::test]
async fn test_evidence_survives_failed_status_write() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 3).await;
    let database = ledger.store().database().clone();

    sqlx::query(
        "CREATE TRIGGER freeze_status BEFORE UPDATE ON integrity_status \
         BEGIN SELECT RAISE(ABORT, 'status is frozen'); END",
    )
    .execute(database.pool())
    .await
    .unwrap();
    tamper_column(&database, 2, "actor", "mallory").await;

    assert!(ledger.run_check().await.is_err());
    assert_eq!(forensic_count(&ledger).await, 1);
    assert_eq!(
        ledger.guard().status().await.unwrap().status,
        StatusKind::Ok
    );
    assert!(ledger.is_locked().await);
}

#[tokio::test]
async fn test_ensure_intact_raises_after_evidence() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 3).await;
    tamper_column(ledger.store().database(), 2, "method", "GET").await;

    match ledger.ensure_intact().await {
        Err(LedgerError::IntegrityViolation { at_sequence, kind }) => {
            assert_eq!(at_sequence, 2);
            assert_eq!(kind, BreakKind::FingerprintMismatch);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(forensic_count(&ledger).await, 1);
}

#[tokio::test]
async fn test_admin_reset_is_audited() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 5).await;
    let database = ledger.store().database().clone();

    tamper_column(&database, 3, "payload_after", FORGED_PAYLOAD).await;
    ledger.run_check().await.unwrap();
    tamper_column(&database, 3, "payload_after", ORIGINAL_PAYLOAD).await;

    let sequence = ledger.admin_reset("root", "restored entry 3 from backup").await.unwrap();
    assert!(!ledger.is_locked().await);

    let status = ledger.get_evidence().await.unwrap();
    assert_eq!(status.status, StatusKind::Ok);
    assert_eq!(status.violated_entry_sequence, None);
    assert_eq!(status.reason, None);

    let chain = ledger.store().read_chain().await.unwrap();
    let reset = chain.last().unwrap();
    assert_eq!(reset.sequence, sequence);
    assert_eq!(reset.action, INTEGRITY_RESET);
    assert_eq!(reset.actor, "root");
    assert!(reset.payload_after.as_deref().unwrap().contains("restored entry 3 from backup"));
    assert!(ledger.run_check().await.unwrap().is_valid());
}

#[tokio::test]
async fn test_violation_persists_across_restart() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 3).await;
    tamper_column(ledger.store().database(), 3, "endpoint", "/elsewhere").await;
    ledger.run_check().await.unwrap();

    let restarted = IntegrityGuard::load(LedgerStore::new(ledger.store().database().clone()))
        .await
        .unwrap();
    assert!(restarted.is_locked().await);
}

async fn forensic_count(ledger: &integrity_ledger::AuditLedger) -> usize {
    ledger
        .store()
        .read_all()
        .await
        .unwrap()
        .iter()
        .filter(|entry| entry.action == AUDIT_VIOLATION)
        .count()
}
