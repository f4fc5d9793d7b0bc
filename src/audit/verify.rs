//! Audit Chain Verification
//!
//! Walks the chain oldest to newest and reports the first break. Content
//! integrity is checked before linkage, so an entry that was both edited and
//! relinked is reported as a fingerprint mismatch.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::entry::LedgerEntry;
use crate::audit::store::LedgerStore;
use crate::error::Result;

/// Which check an entry failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakKind {
    /// The entry's own content no longer matches its fingerprint
    FingerprintMismatch,
    /// The entry's declared predecessor is not the actual predecessor
    LinkMismatch,
}

impl BreakKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakKind::FingerprintMismatch => "FINGERPRINT_MISMATCH",
            BreakKind::LinkMismatch => "LINK_MISMATCH",
        }
    }
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a chain walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Valid {
        checked_count: usize,
    },
    Broken {
        at_sequence: i64,
        kind: BreakKind,
        expected: Option<String>,
        found: Option<String>,
    },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }

    pub fn broken_at(&self) -> Option<(i64, BreakKind)> {
        match self {
            Verdict::Broken {
                at_sequence, kind, ..
            } => Some((*at_sequence, *kind)),
            Verdict::Valid { .. } => None,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            Verdict::Valid { checked_count } => {
                format!("Audit chain is valid ({} entries)", checked_count)
            }
            Verdict::Broken {
                at_sequence,
                kind,
                expected,
                found,
            } => format!(
                "Audit chain broken at sequence {}: {} (expected {}, found {})",
                at_sequence,
                kind,
                expected.as_deref().unwrap_or("none"),
                found.as_deref().unwrap_or("none")
            ),
        }
    }
}

/// Verify a chain already loaded in sequence order
pub fn verify_chain(entries: &[LedgerEntry]) -> Verdict {
    let mut expected_prev: Option<&str> = None;

    for entry in entries {
        let recomputed = entry.recompute_fingerprint();
        if entry.fingerprint.as_deref() != Some(recomputed.as_str()) {
            return Verdict::Broken {
                at_sequence: entry.sequence,
                kind: BreakKind::FingerprintMismatch,
                expected: Some(recomputed),
                found: entry.fingerprint.clone(),
            };
        }

        if entry.prev_fingerprint.as_deref() != expected_prev {
            return Verdict::Broken {
                at_sequence: entry.sequence,
                kind: BreakKind::LinkMismatch,
                expected: expected_prev.map(str::to_string),
                found: entry.prev_fingerprint.clone(),
            };
        }

        expected_prev = entry.fingerprint.as_deref();
    }

    Verdict::Valid {
        checked_count: entries.len(),
    }
}

/// Sequences of entries whose content no longer matches their fingerprint
pub fn find_tampered_entries(entries: &[LedgerEntry]) -> Vec<i64> {
    entries
        .iter()
        .filter(|entry| !entry.verify_fingerprint())
        .map(|entry| entry.sequence)
        .collect()
}

/// Information about a hole in the sequence numbering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceGap {
    pub after_sequence: i64,
    pub next_sequence: i64,
}

/// Holes in the numbering of a full ledger read (chain and forensic rows).
/// Gaps are diagnostics only; linkage decides whether the chain is intact.
pub fn detect_sequence_gaps(entries: &[LedgerEntry]) -> Vec<SequenceGap> {
    entries
        .windows(2)
        .filter(|pair| pair[1].sequence != pair[0].sequence + 1)
        .map(|pair| SequenceGap {
            after_sequence: pair[0].sequence,
            next_sequence: pair[1].sequence,
        })
        .collect()
}

/// Verifier bound to a ledger store
#[derive(Clone)]
pub struct ChainVerifier {
    store: LedgerStore,
}

impl ChainVerifier {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Read the whole chain and verify it. A read failure is an error,
    /// never a verdict.
    pub async fn verify(&self) -> Result<Verdict> {
        let entries = self.store.read_chain().await?;
        debug!("Verifying audit chain of {} entries", entries.len());

        let verdict = verify_chain(&entries);
        match &verdict {
            Verdict::Valid { checked_count } => {
                info!("Audit chain verification successful: {} entries", checked_count)
            }
            Verdict::Broken { .. } => warn!("{}", verdict.summary()),
        }
        Ok(verdict)
    }
}
