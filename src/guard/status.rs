//! Integrity Status
//!
//! Persistence of the singleton `integrity_status` row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::database::Database;
use crate::error::{LedgerError, Result};

/// Integrity state of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Ok,
    Violated,
    Unknown,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Ok => "OK",
            StatusKind::Violated => "VIOLATED",
            StatusKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StatusKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "OK" => Ok(StatusKind::Ok),
            "VIOLATED" => Ok(StatusKind::Violated),
            "UNKNOWN" => Ok(StatusKind::Unknown),
            _ => Err(format!("Invalid integrity status: {}", s)),
        }
    }
}

/// Snapshot of the singleton status row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityStatus {
    pub status: StatusKind,
    pub last_check_at: Option<DateTime<Utc>>,
    pub violated_at: Option<DateTime<Utc>>,
    pub violated_entry_sequence: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct StatusStore {
    database: Database,
}

impl StatusStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn load(&self) -> Result<IntegrityStatus> {
        let row = sqlx::query(
            r#"
            SELECT status, last_check_at, violated_at, violated_entry_sequence, reason
            FROM integrity_status
            WHERE id = 1
            "#,
        )
        .fetch_optional(self.database.pool())
        .await?
        .ok_or_else(|| LedgerError::Storage("Integrity status row is missing".to_string()))?;

        Ok(IntegrityStatus {
            status: row
                .try_get::<String, _>("status")?
                .parse()
                .map_err(LedgerError::Storage)?,
            last_check_at: row.try_get("last_check_at")?,
            violated_at: row.try_get("violated_at")?,
            violated_entry_sequence: row.try_get("violated_entry_sequence")?,
            reason: row.try_get("reason")?,
        })
    }

    /// Record a successful check; VIOLATED is left untouched
    pub async fn record_valid_check(&self, now: DateTime<Utc>) -> Result<()> {
        self.execute(
            r#"
            UPDATE integrity_status
               SET last_check_at = ?,
                   status = CASE WHEN status = 'VIOLATED' THEN 'VIOLATED' ELSE 'OK' END
             WHERE id = 1
            "#,
            now,
        )
        .await
    }

    /// Record a check that could not complete; VIOLATED is left untouched
    pub async fn record_failed_check(&self, now: DateTime<Utc>) -> Result<()> {
        self.execute(
            r#"
            UPDATE integrity_status
               SET last_check_at = ?,
                   status = CASE WHEN status = 'VIOLATED' THEN 'VIOLATED' ELSE 'UNKNOWN' END
             WHERE id = 1
            "#,
            now,
        )
        .await
    }

    /// Enter VIOLATED, keeping the first detection time
    pub async fn mark_violated(&self, now: DateTime<Utc>, sequence: i64, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE integrity_status
               SET status = 'VIOLATED',
                   last_check_at = ?,
                   violated_at = CASE WHEN status = 'VIOLATED' THEN COALESCE(violated_at, ?) ELSE ? END,
                   violated_entry_sequence = ?,
                   reason = ?
             WHERE id = 1
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(sequence)
        .bind(reason)
        .execute(self.database.pool())
        .await?;
        Ok(())
    }

    /// Administrative reset back to OK
    pub async fn reset(&self, now: DateTime<Utc>) -> Result<()> {
        self.execute(
            r#"
            UPDATE integrity_status
               SET status = 'OK',
                   last_check_at = ?,
                   violated_at = NULL,
                   violated_entry_sequence = NULL,
                   reason = NULL
             WHERE id = 1
            "#,
            now,
        )
        .await
    }

    async fn execute(&self, sql: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(sql)
            .bind(now)
            .execute(self.database.pool())
            .await?;
        Ok(())
    }
}
