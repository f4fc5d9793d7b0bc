//! OpenTimestamps Client
//!
//! Submits ledger head digests to an OpenTimestamps calendar server. The
//! calendar answers with a pending timestamp that is later upgraded to a
//! Bitcoin attestation by standard OTS tooling.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::anchor::{AnchorPayload, Witness};
use crate::error::{LedgerError, Result};

const KIND: &str = "opentimestamps";

/// OpenTimestamps calendar client
pub struct OtsClient {
    calendar_url: String,
    http_client: Client,
}

impl OtsClient {
    pub fn new(calendar_url: String) -> Self {
        Self {
            calendar_url: calendar_url.trim_end_matches('/').to_string(),
            http_client: Client::new(),
        }
    }

    pub fn calendar_url(&self) -> &str {
        &self.calendar_url
    }

    /// Submit a 32-byte SHA-256 digest and return the pending timestamp
    pub async fn stamp(&self, digest: &[u8]) -> Result<Vec<u8>> {
        if digest.len() != 32 {
            return Err(LedgerError::witness(
                KIND,
                format!("expected a 32-byte digest, got {} bytes", digest.len()),
            ));
        }

        let response = self
            .http_client
            .post(format!("{}/digest", self.calendar_url))
            .header("Accept", "application/vnd.opentimestamps.v1")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(digest.to_vec())
            .send()
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;

        if !response.status().is_success() {
            return Err(LedgerError::witness(
                KIND,
                format!("calendar returned {}", response.status()),
            ));
        }

        let proof = response
            .bytes()
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;
        info!(
            "Calendar {} returned a {}-byte pending timestamp",
            self.calendar_url,
            proof.len()
        );
        Ok(proof.to_vec())
    }
}

/// Witness that stores one calendar proof per anchor on disk
pub struct OtsCalendarWitness {
    client: OtsClient,
    proofs_dir: PathBuf,
}

impl OtsCalendarWitness {
    pub fn new(client: OtsClient, proofs_dir: PathBuf) -> Self {
        Self { client, proofs_dir }
    }
}

#[async_trait]
impl Witness for OtsCalendarWitness {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn publish(&self, payload: &AnchorPayload) -> Result<String> {
        let digest = hex::decode(&payload.head_fingerprint)
            .map_err(|e| LedgerError::witness(KIND, format!("invalid head fingerprint: {}", e)))?;
        let proof = self.client.stamp(&digest).await?;

        tokio::fs::create_dir_all(&self.proofs_dir)
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;
        let path = self
            .proofs_dir
            .join(format!("{}-{}.ots", payload.head_fingerprint, payload.anchor_id));
        tokio::fs::write(&path, &proof)
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;

        Ok(path.display().to_string())
    }
}
