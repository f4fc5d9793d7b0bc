//! Chain building and verification against a real database

mod common;

use std::collections::HashSet;

use common::*;
use integrity_ledger::audit::hash::{self, EventFields};
use integrity_ledger::audit::verify::detect_sequence_gaps;
use integrity_ledger::audit::{AuditFilter, BreakKind, RecordEvent, Verdict};

#[tokio::test]
async fn test_fingerprint_is_deterministic() {
    let fields = EventFields {
        sequence: 1,
        timestamp: "2025-03-01T12:00:00.000000Z",
        actor: "alice",
        role: "editor",
        action: "INSERT",
        resource: "registros",
        resource_id: Some("1"),
        payload_before: None,
        payload_after: Some(r#"{"valor":10}"#),
        endpoint: "/registros",
        method: "POST",
    };

    let first = hash::fingerprint(&fields, None);
    let second = hash::fingerprint(&fields, None);
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[tokio::test]
async fn test_clean_appends_verify() {
    let ledger = setup_ledger().await;
    let sequences = seed_events(&ledger, 10).await;
    assert_eq!(sequences, (1..=10).collect::<Vec<_>>());

    let verdict = ledger.verify_chain().await.unwrap();
    assert_eq!(verdict, Verdict::Valid { checked_count: 10 });
}

#[tokio::test]
async fn test_altered_payload_is_fingerprint_mismatch() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 5).await;

    tamper_column(ledger.store().database(), 3, "payload_after", r#"{"id":3,"valor":999}"#).await;

    let verdict = ledger.verify_chain().await.unwrap();
    assert_eq!(verdict.broken_at(), Some((3, BreakKind::FingerprintMismatch)));
}

#[tokio::test]
async fn test_deleted_entry_is_link_mismatch_at_successor() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 5).await;
    let chain = ledger.store().read_chain().await.unwrap();

    delete_entry(ledger.store().database(), 3).await;

    match ledger.verify_chain().await.unwrap() {
        Verdict::Broken {
            at_sequence,
            kind,
            expected,
            found,
        } => {
            assert_eq!(at_sequence, 4);
            assert_eq!(kind, BreakKind::LinkMismatch);
            assert_eq!(expected, chain[1].fingerprint);
            assert_eq!(found, chain[2].fingerprint);
        }
        other => panic!("unexpected verdict: {:?}", other),
    }
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 4).await;
    tamper_column(ledger.store().database(), 2, "actor", "mallory").await;

    let before = ledger.store().read_all().await.unwrap();
    let first = ledger.verify_chain().await.unwrap();
    let second = ledger.verify_chain().await.unwrap();
    let after = ledger.store().read_all().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_insert_update_delete_scenario() {
    let ledger = setup_ledger().await;
    ledger.record_event(business_event("INSERT", 1)).await.unwrap();
    ledger.record_event(business_event("UPDATE", 1)).await.unwrap();
    ledger.record_event(business_event("DELETE", 1)).await.unwrap();

    let verdict = ledger.run_check().await.unwrap();
    assert_eq!(verdict, Verdict::Valid { checked_count: 3 });
    assert!(!ledger.is_locked().await);
}

#[tokio::test]
async fn test_flipped_fingerprint_bit_locks() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 3).await;
    let chain = ledger.store().read_chain().await.unwrap();
    let flipped = flip_last_bit(chain[1].fingerprint.as_deref().unwrap());

    tamper_column(ledger.store().database(), 2, "fingerprint", &flipped).await;

    let verdict = ledger.run_check().await.unwrap();
    assert_eq!(verdict.broken_at(), Some((2, BreakKind::FingerprintMismatch)));
    assert!(ledger.is_locked().await);
}

#[tokio::test]
async fn test_concurrent_appends_never_fork() {
    let ledger = setup_ledger().await;

    let tasks: Vec<_> = (1..=25)
        .map(|id| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.record_event(business_event("INSERT", id)).await })
        })
        .collect();

    let mut sequences = HashSet::new();
    for task in tasks {
        sequences.insert(task.await.unwrap().unwrap());
    }
    assert_eq!(sequences.len(), 25);

    let chain = ledger.store().read_chain().await.unwrap();
    let links: HashSet<_> = chain.iter().map(|e| e.prev_fingerprint.clone()).collect();
    assert_eq!(links.len(), 25);
    assert_eq!(
        ledger.verify_chain().await.unwrap(),
        Verdict::Valid { checked_count: 25 }
    );
}

#[tokio::test]
async fn test_storage_rejects_rewrites() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 2).await;
    let pool = ledger.store().database().pool();

    assert!(sqlx::query("UPDATE ledger_entries SET payload_after = NULL WHERE sequence = 1")
        .execute(pool)
        .await
        .is_err());
    assert!(sqlx::query("DELETE FROM ledger_entries WHERE sequence = 2")
        .execute(pool)
        .await
        .is_err());
    assert_eq!(
        ledger.verify_chain().await.unwrap(),
        Verdict::Valid { checked_count: 2 }
    );
}

#[tokio::test]
async fn test_truncated_tail_leaves_visible_gap() {
    let ledger = setup_ledger().await;
    seed_events(&ledger, 3).await;
    delete_entry(ledger.store().database(), 3).await;

    let next = ledger.record_event(business_event("INSERT", 4)).await.unwrap();
    assert_eq!(next, 4);

    let gaps = detect_sequence_gaps(&ledger.store().read_all().await.unwrap());
    assert_eq!(gaps.len(), 1);
    assert_eq!((gaps[0].after_sequence, gaps[0].next_sequence), (2, 4));
}

async fn seed_mixed_history(ledger: &integrity_ledger::AuditLedger) -> chrono::DateTime<chrono::Utc> {
    for (actor, action, resource) in [
        ("alice", "INSERT", "registros"),
        ("bob", "UPDATE", "registros"),
        ("alice", "DELETE", "usuarios"),
    ] {
        let event = RecordEvent::new(actor, "editor", action, resource).via("/", "POST");
        ledger.record_event(event).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let cutoff = chrono::Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let event = RecordEvent::new("bob", "editor", "UPDATE", "usuarios").via("/", "PUT");
    ledger.record_event(event).await.unwrap();
    cutoff
}

#[tokio::test]
async fn test_list_filters_by_field() {
    let ledger = setup_ledger().await;
    seed_mixed_history(&ledger).await;

    let all = ledger.list_events(&AuditFilter::default()).await.unwrap();
    let sequences: Vec<i64> = all.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![4, 3, 2, 1]);

    let by_actor = AuditFilter {
        actor: Some("alice".to_string()),
        ..Default::default()
    };
    let entries = ledger.list_events(&by_actor).await.unwrap();
    assert_eq!(entries.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![3, 1]);

    let by_action = AuditFilter {
        action: Some("UPDATE".to_string()),
        ..Default::default()
    };
    let entries = ledger.list_events(&by_action).await.unwrap();
    assert_eq!(entries.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![4, 2]);

    let combined = AuditFilter {
        actor: Some("bob".to_string()),
        resource: Some("usuarios".to_string()),
        ..Default::default()
    };
    let entries = ledger.list_events(&combined).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sequence, 4);
}

#[tokio::test]
async fn test_list_filters_by_date_range_and_limit() {
    let ledger = setup_ledger().await;
    let cutoff = seed_mixed_history(&ledger).await;

    let after = AuditFilter {
        from: Some(cutoff),
        ..Default::default()
    };
    let entries = ledger.list_events(&after).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sequence, 4);

    let before = AuditFilter {
        to: Some(cutoff),
        ..Default::default()
    };
    assert_eq!(ledger.list_events(&before).await.unwrap().len(), 3);

    let limited = AuditFilter {
        limit: Some(2),
        ..Default::default()
    };
    let entries = ledger.list_events(&limited).await.unwrap();
    assert_eq!(entries.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![4, 3]);
}
