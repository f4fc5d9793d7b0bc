//! Audit Ledger
//!
//! Tamper-evident ledger of state-changing operations with SHA-256 hash
//! chains, chain verification and out-of-chain forensic evidence.

pub mod entry;
pub mod forensic;
pub mod hash;
pub mod store;
pub mod verify;

pub use entry::{LedgerEntry, PendingEntry, RecordEvent};
pub use forensic::ForensicRecorder;
pub use store::{AuditFilter, LedgerStore};
pub use verify::{verify_chain, BreakKind, ChainVerifier, Verdict};
