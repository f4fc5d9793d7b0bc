//! External Anchoring
//!
//! Publishes the chain head to independent witnesses so the ledger's state
//! can be proven later even if the database itself is rewritten.

pub mod git;
pub mod local_file;
pub mod ots;
pub mod paste;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AnchorConfig;
use crate::error::Result;

pub use git::GitWitness;
pub use local_file::{audit_local_anchors, AnchorAudit, LocalFileWitness};
pub use ots::{OtsCalendarWitness, OtsClient};
pub use paste::PasteWitness;

/// What every witness records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPayload {
    /// Absent in records written before anchors carried an id
    #[serde(default)]
    pub anchor_id: Uuid,
    pub timestamp: String,
    pub head_fingerprint: String,
    pub operator: String,
    pub chain_length: i64,
}

/// An independent place the chain head can be published to
#[async_trait]
pub trait Witness: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Publish the payload and return a receipt locating the copy
    async fn publish(&self, payload: &AnchorPayload) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessOutcome {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WitnessOutcome {
    pub fn receipt(kind: &str, receipt: String) -> Self {
        Self {
            kind: kind.to_string(),
            receipt: Some(receipt),
            error: None,
        }
    }

    pub fn failure(kind: &str, error: String) -> Self {
        Self {
            kind: kind.to_string(),
            receipt: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.receipt.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReport {
    pub anchor_id: Uuid,
    pub head_fingerprint: String,
    pub timestamp: DateTime<Utc>,
    pub witnesses: Vec<WitnessOutcome>,
}

impl AnchorReport {
    pub fn succeeded(&self) -> usize {
        self.witnesses.iter().filter(|w| w.is_success()).count()
    }
}

/// Fans a payload out to every configured witness
#[derive(Clone)]
pub struct AnchorPublisher {
    witnesses: Vec<Arc<dyn Witness>>,
    timeout: Duration,
}

impl AnchorPublisher {
    pub fn new(witnesses: Vec<Arc<dyn Witness>>, timeout: Duration) -> Self {
        Self { witnesses, timeout }
    }

    pub fn from_config(config: &AnchorConfig) -> Self {
        let mut witnesses: Vec<Arc<dyn Witness>> = Vec::new();
        if config.local_file.enabled {
            witnesses.push(Arc::new(LocalFileWitness::new(config.local_file.path.clone())));
        }
        if config.git.enabled {
            witnesses.push(Arc::new(
                GitWitness::new(config.git.repo_path.clone(), config.git.file_name.clone())
                    .with_program(config.git.program.clone()),
            ));
        }
        if config.paste.enabled {
            witnesses.push(Arc::new(PasteWitness::new(config.paste.clone())));
        }
        if config.opentimestamps.enabled {
            witnesses.push(Arc::new(OtsCalendarWitness::new(
                OtsClient::new(config.opentimestamps.calendar_url.clone()),
                config.opentimestamps.proofs_dir.clone(),
            )));
        }

        info!(
            "Anchor publisher configured with {} witness(es)",
            witnesses.len()
        );
        Self::new(witnesses, Duration::from_secs(config.witness_timeout_secs.max(1)))
    }

    pub fn witness_kinds(&self) -> Vec<&'static str> {
        self.witnesses.iter().map(|w| w.kind()).collect()
    }

    /// Run every witness concurrently. Failures are reported per witness
    /// and never abort the others.
    pub async fn publish(&self, payload: &AnchorPayload) -> Vec<WitnessOutcome> {
        let calls = self.witnesses.iter().map(|witness| async move {
            let kind = witness.kind();
            match tokio::time::timeout(self.timeout, witness.publish(payload)).await {
                Ok(Ok(receipt)) => {
                    info!("Anchored {} via {}: {}", payload.head_fingerprint, kind, receipt);
                    WitnessOutcome::receipt(kind, receipt)
                }
                Ok(Err(e)) => {
                    warn!("Anchor witness {} failed: {}", kind, e);
                    WitnessOutcome::failure(kind, e.to_string())
                }
                Err(_) => {
                    warn!("Anchor witness {} timed out", kind);
                    WitnessOutcome::failure(kind, format!("timed out after {:?}", self.timeout))
                }
            }
        });

        join_all(calls).await
    }
}
