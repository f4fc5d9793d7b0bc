use thiserror::Error;

use crate::audit::verify::BreakKind;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(format!("Database error: {}", err))
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(format!("Migration error: {}", err))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Integrity violation at sequence {at_sequence}: {kind}")]
    IntegrityViolation { at_sequence: i64, kind: BreakKind },

    #[error("System locked: audit integrity violation detected")]
    Locked,

    #[error("Witness {kind} failed: {message}")]
    Witness { kind: String, message: String },

    #[error("Audit chain is empty")]
    EmptyChain,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    pub fn witness(kind: &str, message: impl std::fmt::Display) -> Self {
        Self::Witness {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }

    /// Machine-readable code surfaced to HTTP clients
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Storage(_) => "storage_error",
            LedgerError::IntegrityViolation { .. } => "integrity_violation",
            LedgerError::Locked => "system_locked",
            LedgerError::Witness { .. } => "witness_error",
            LedgerError::EmptyChain => "empty_chain",
            LedgerError::InvalidState(_) => "invalid_state",
            LedgerError::Config(_) => "config_error",
            LedgerError::Serialization(_) => "serialization_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
