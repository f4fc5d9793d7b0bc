#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use integrity_ledger::anchor::{AnchorPublisher, Witness};
use integrity_ledger::audit::{LedgerStore, RecordEvent};
use integrity_ledger::database::Database;
use integrity_ledger::guard::IntegrityGuard;
use integrity_ledger::AuditLedger;
use serde_json::json;

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory().await.expect("Failed to create test database")
}

/// Ledger over a fresh database with no anchor witnesses, checked once so
/// it starts unlocked
pub async fn setup_ledger() -> AuditLedger {
    setup_ledger_with(Vec::new()).await
}

pub async fn setup_ledger_with(witnesses: Vec<Arc<dyn Witness>>) -> AuditLedger {
    let ledger = setup_unchecked_ledger(witnesses).await;
    ledger.run_check().await.expect("Failed to run initial check");
    ledger
}

/// Ledger whose status is still UNKNOWN
pub async fn setup_unchecked_ledger(witnesses: Vec<Arc<dyn Witness>>) -> AuditLedger {
    let store = LedgerStore::new(setup_test_db().await);
    let guard = IntegrityGuard::load(store.clone())
        .await
        .expect("Failed to load integrity guard");
    AuditLedger::new(store, guard, AnchorPublisher::new(witnesses, Duration::from_secs(5)))
}

/// A business event as a CRUD collaborator would record it
pub fn business_event(action: &str, id: i64) -> RecordEvent {
    let method = match action {
        "INSERT" => "POST",
        "DELETE" => "DELETE",
        _ => "PUT",
    };
    RecordEvent::new("alice", "editor", action, "registros")
        .resource_id(id.to_string())
        .payloads(
            Some(json!({ "id": id, "valor": id * 10 })),
            Some(json!({ "id": id, "valor": id * 10 + 1 })),
        )
        .via(&format!("/registros/{}", id), method)
}

/// Append `count` events and return their sequences
pub async fn seed_events(ledger: &AuditLedger, count: i64) -> Vec<i64> {
    let mut sequences = Vec::new();
    for id in 1..=count {
        let sequence = ledger
            .record_event(business_event("UPDATE", id))
            .await
            .expect("Failed to record event");
        sequences.push(sequence);
    }
    sequences
}

/// Overwrite a stored column behind the ledger's back
pub async fn tamper_column(database: &Database, sequence: i64, column: &str, value: &str) {
    sqlx::query("DROP TRIGGER IF EXISTS trg_ledger_entries_no_update")
        .execute(database.pool())
        .await
        .expect("Failed to drop update trigger");
    sqlx::query(&format!(
        "UPDATE ledger_entries SET {} = ? WHERE sequence = ?",
        column
    ))
    .bind(value)
    .bind(sequence)
    .execute(database.pool())
    .await
    .expect("Failed to tamper with entry");
}

/// Remove a stored entry behind the ledger's back
pub async fn delete_entry(database: &Database, sequence: i64) {
    sqlx::query("DROP TRIGGER IF EXISTS trg_ledger_entries_no_delete")
        .execute(database.pool())
        .await
        .expect("Failed to drop delete trigger");
    sqlx::query("DELETE FROM ledger_entries WHERE sequence = ?")
        .bind(sequence)
        .execute(database.pool())
        .await
        .expect("Failed to delete entry");
}

/// Flip the lowest bit of the last hex digit
pub fn flip_last_bit(fingerprint: &str) -> String {
    let (head, last) = fingerprint.split_at(fingerprint.len() - 1);
    let nibble = u8::from_str_radix(last, 16).expect("hex digit") ^ 1;
    format!("{}{:x}", head, nibble)
}
