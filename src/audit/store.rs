//! Ledger Store
//!
//! Append-only persistence for ledger entries. Appends are serialized
//! in-process by a mutex and across processes by the unique chain-link
//! index, so the chain can never fork.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::audit::entry::{LedgerEntry, PendingEntry};
use crate::audit::hash;
use crate::database::Database;
use crate::error::{LedgerError, Result};

const ENTRY_COLUMNS: &str = "sequence, timestamp, actor, role, action, resource, resource_id, \
     payload_before, payload_after, endpoint, method, prev_fingerprint, fingerprint";

pub const DEFAULT_LIST_LIMIT: i64 = 500;
const MAX_LIST_LIMIT: i64 = 5000;

/// Criteria for listing ledger entries; unset fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    /// Inclusive lower bound on the entry timestamp
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the entry timestamp
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

fn stored_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Ledger store backed by the `ledger_entries` table
#[derive(Clone)]
pub struct LedgerStore {
    database: Database,
    append_lock: Arc<Mutex<()>>,
}

impl LedgerStore {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Append a chain entry and return its sequence
    pub async fn append(&self, pending: PendingEntry) -> Result<i64> {
        let _guard = self.append_lock.lock().await;
        let mut tx = self.database.pool().begin().await?;

        let sequence = next_sequence(&mut tx).await?;
        let prev_fingerprint: Option<String> = sqlx::query_scalar(
            r#"
            SELECT fingerprint
            FROM ledger_entries
            WHERE fingerprint IS NOT NULL
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let fingerprint = hash::fingerprint(&pending.fields(sequence), prev_fingerprint.as_deref());

        if let Err(e) = insert(&mut tx, sequence, &pending, prev_fingerprint.as_deref(), Some(&fingerprint)).await {
            warn!("Ledger append rolled back at sequence {}: {}", sequence, e);
            tx.rollback().await?;
            return Err(e);
        }
        tx.commit().await?;

        debug!(
            "Appended ledger entry #{} {} {} ({})",
            sequence, pending.action, pending.resource, fingerprint
        );
        Ok(sequence)
    }

    /// Append an entry that stays outside the chain
    pub async fn append_out_of_chain(&self, pending: PendingEntry) -> Result<i64> {
        let _guard = self.append_lock.lock().await;
        let mut tx = self.database.pool().begin().await?;

        let sequence = next_sequence(&mut tx).await?;
        if let Err(e) = insert(&mut tx, sequence, &pending, None, None).await {
            tx.rollback().await?;
            return Err(e);
        }
        tx.commit().await?;

        debug!("Appended out-of-chain entry #{} {}", sequence, pending.action);
        Ok(sequence)
    }

    /// All chain entries, oldest first
    pub async fn read_chain(&self) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries WHERE fingerprint IS NOT NULL ORDER BY sequence ASC",
            ENTRY_COLUMNS
        ))
        .fetch_all(self.database.pool())
        .await?;
        Ok(entries)
    }

    /// Every entry including forensic records, oldest first
    pub async fn read_all(&self) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries ORDER BY sequence ASC",
            ENTRY_COLUMNS
        ))
        .fetch_all(self.database.pool())
        .await?;
        Ok(entries)
    }

    /// Fingerprint of the newest chain entry
    pub async fn head_fingerprint(&self) -> Result<Option<String>> {
        let head: Option<String> = sqlx::query_scalar(
            r#"
            SELECT fingerprint
            FROM ledger_entries
            WHERE fingerprint IS NOT NULL
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.database.pool())
        .await?;
        Ok(head)
    }

    pub async fn count_chain(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE fingerprint IS NOT NULL")
                .fetch_one(self.database.pool())
                .await?;
        Ok(count)
    }

    /// Entries matching the filter, newest first, forensic rows included
    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE (?1 IS NULL OR actor = ?1)
              AND (?2 IS NULL OR action = ?2)
              AND (?3 IS NULL OR resource = ?3)
              AND (?4 IS NULL OR timestamp >= ?4)
              AND (?5 IS NULL OR timestamp <= ?5)
            ORDER BY sequence DESC
            LIMIT ?6
            "#,
            ENTRY_COLUMNS
        ))
        .bind(&filter.actor)
        .bind(&filter.action)
        .bind(&filter.resource)
        .bind(filter.from.as_ref().map(stored_timestamp))
        .bind(filter.to.as_ref().map(stored_timestamp))
        .bind(filter.effective_limit())
        .fetch_all(self.database.pool())
        .await?;
        Ok(entries)
    }

    /// Newest entry with the given action, in or out of the chain
    pub async fn latest_by_action(&self, action: &str) -> Result<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries WHERE action = ? ORDER BY sequence DESC LIMIT 1",
            ENTRY_COLUMNS
        ))
        .bind(action)
        .fetch_optional(self.database.pool())
        .await?;
        Ok(entry)
    }
}

/// Next sequence above both the high-water mark and the live rows
async fn next_sequence(tx: &mut Transaction<'_, Sqlite>) -> Result<i64> {
    let high: i64 = sqlx::query_scalar(
        r#"
        SELECT MAX(
            COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'ledger_entries'), 0),
            COALESCE((SELECT MAX(sequence) FROM ledger_entries), 0)
        )
        "#,
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(high + 1)
}

async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    sequence: i64,
    pending: &PendingEntry,
    prev_fingerprint: Option<&str>,
    fingerprint: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries
        (sequence, timestamp, actor, role, action, resource, resource_id,
         payload_before, payload_after, endpoint, method, prev_fingerprint, fingerprint)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(sequence)
    .bind(&pending.timestamp)
    .bind(&pending.actor)
    .bind(&pending.role)
    .bind(&pending.action)
    .bind(&pending.resource)
    .bind(&pending.resource_id)
    .bind(&pending.payload_before)
    .bind(&pending.payload_after)
    .bind(&pending.endpoint)
    .bind(&pending.method)
    .bind(prev_fingerprint)
    .bind(fingerprint)
    .execute(&mut **tx)
    .await
    .map_err(|e| LedgerError::Storage(format!("Failed to insert ledger entry: {}", e)))?;

    Ok(())
}
