//! Ledger Entry
//!
//! Defines the structure for tamper-evident ledger entries and the
//! caller-facing event that becomes one once the store assigns its
//! sequence and fingerprints.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::audit::hash::{self, canonical_payload, EventFields};

/// Action token used for forensic evidence entries
pub const AUDIT_VIOLATION: &str = "AUDIT_VIOLATION";
/// Action token used when an operator clears a violation
pub const INTEGRITY_RESET: &str = "INTEGRITY_RESET";

/// Ledger entry as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: i64,
    pub timestamp: String,
    pub actor: String,
    pub role: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub payload_before: Option<String>,
    pub payload_after: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub prev_fingerprint: Option<String>,
    pub fingerprint: Option<String>,
}

impl LedgerEntry {
    pub fn fields(&self) -> EventFields<'_> {
        EventFields {
            sequence: self.sequence,
            timestamp: &self.timestamp,
            actor: &self.actor,
            role: &self.role,
            action: &self.action,
            resource: &self.resource,
            resource_id: self.resource_id.as_deref(),
            payload_before: self.payload_before.as_deref(),
            payload_after: self.payload_after.as_deref(),
            endpoint: &self.endpoint,
            method: &self.method,
        }
    }

    /// Recompute the fingerprint from the stored fields and stored link
    pub fn recompute_fingerprint(&self) -> String {
        hash::fingerprint(&self.fields(), self.prev_fingerprint.as_deref())
    }

    /// Whether the stored fingerprint matches the stored content
    pub fn verify_fingerprint(&self) -> bool {
        match &self.fingerprint {
            Some(stored) => *stored == self.recompute_fingerprint(),
            None => false,
        }
    }

    /// Forensic entries carry no fingerprints and never join the chain
    pub fn is_chain_participant(&self) -> bool {
        self.fingerprint.is_some()
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "#{} {} {} {}{} by {} ({})",
            self.sequence,
            self.action,
            self.method,
            self.resource,
            self.resource_id
                .as_deref()
                .map(|id| format!("/{}", id))
                .unwrap_or_default(),
            self.actor,
            self.role
        )
    }
}

impl<'r> FromRow<'r, SqliteRow> for LedgerEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            sequence: row.try_get("sequence")?,
            timestamp: row.try_get("timestamp")?,
            actor: row.try_get("actor")?,
            role: row.try_get("role")?,
            action: row.try_get("action")?,
            resource: row.try_get("resource")?,
            resource_id: row.try_get("resource_id")?,
            payload_before: row.try_get("payload_before")?,
            payload_after: row.try_get("payload_after")?,
            endpoint: row.try_get("endpoint")?,
            method: row.try_get("method")?,
            prev_fingerprint: row.try_get("prev_fingerprint")?,
            fingerprint: row.try_get("fingerprint")?,
        })
    }
}

/// An event handed to the ledger by a collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordEvent {
    pub actor: String,
    pub role: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub payload_before: Option<serde_json::Value>,
    #[serde(default)]
    pub payload_after: Option<serde_json::Value>,
    pub endpoint: String,
    pub method: String,
}

impl RecordEvent {
    pub fn new(actor: &str, role: &str, action: &str, resource: &str) -> Self {
        Self {
            actor: actor.to_string(),
            role: role.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            ..Default::default()
        }
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn payloads(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.payload_before = before;
        self.payload_after = after;
        self
    }

    pub fn via(mut self, endpoint: &str, method: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self.method = method.to_string();
        self
    }

    /// Stamp the event with the caller's clock and canonicalize payloads
    pub fn into_pending(self) -> PendingEntry {
        PendingEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            actor: self.actor,
            role: self.role,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            payload_before: self.payload_before.as_ref().map(canonical_payload),
            payload_after: self.payload_after.as_ref().map(canonical_payload),
            endpoint: self.endpoint,
            method: self.method,
        }
    }
}

/// Entry content with its timestamp fixed, waiting for a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub timestamp: String,
    pub actor: String,
    pub role: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub payload_before: Option<String>,
    pub payload_after: Option<String>,
    pub endpoint: String,
    pub method: String,
}

impl PendingEntry {
    pub fn fields(&self, sequence: i64) -> EventFields<'_> {
        EventFields {
            sequence,
            timestamp: &self.timestamp,
            actor: &self.actor,
            role: &self.role,
            action: &self.action,
            resource: &self.resource,
            resource_id: self.resource_id.as_deref(),
            payload_before: self.payload_before.as_deref(),
            payload_after: self.payload_after.as_deref(),
            endpoint: &self.endpoint,
            method: &self.method,
        }
    }
}
