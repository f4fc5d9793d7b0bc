//! Local anchor file
//!
//! One JSON record per line, appended and fsynced. The file lives outside
//! the database so a rewrite of the ledger does not touch it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::anchor::{AnchorPayload, Witness};
use crate::audit::LedgerEntry;
use crate::error::{LedgerError, Result};

const KIND: &str = "local_file";

pub struct LocalFileWitness {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFileWitness {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Witness for LocalFileWitness {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn publish(&self, payload: &AnchorPayload) -> Result<String> {
        let _writing = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::witness(KIND, e))?;
        }

        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents.lines().count(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(LedgerError::witness(KIND, e)),
        };

        let mut line = serde_json::to_string(payload)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;
        file.sync_all()
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;

        Ok(format!("{}#{}", self.path.display(), existing + 1))
    }
}

/// An anchored head and where it was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchoredHead {
    pub line: usize,
    pub record: AnchorPayload,
}

/// Result of cross-checking the anchor file against the chain
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnchorAudit {
    pub checked: usize,
    pub missing: Vec<AnchoredHead>,
}

impl AnchorAudit {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Check that every head recorded in the anchor file still exists in the
/// chain. A missing head means the ledger was rewritten after anchoring.
pub async fn audit_local_anchors(path: &Path, chain: &[LedgerEntry]) -> Result<AnchorAudit> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        LedgerError::Storage(format!("Cannot read anchor file {}: {}", path.display(), e))
    })?;

    let known: HashSet<&str> = chain
        .iter()
        .filter_map(|entry| entry.fingerprint.as_deref())
        .collect();

    let mut audit = AnchorAudit::default();
    for (index, raw) in contents.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let record: AnchorPayload = serde_json::from_str(raw).map_err(|e| {
            LedgerError::Serialization(format!("Anchor file line {}: {}", index + 1, e))
        })?;
        audit.checked += 1;

        if known.contains(record.head_fingerprint.as_str()) {
            debug!("Anchor line {} found in chain", index + 1);
        } else {
            warn!(
                "Anchored head {} (line {}) is missing from the chain",
                record.head_fingerprint,
                index + 1
            );
            audit.missing.push(AnchoredHead {
                line: index + 1,
                record,
            });
        }
    }

    Ok(audit)
}
