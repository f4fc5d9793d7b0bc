//! HTTP mapping for ledger errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::LedgerError;

pub const LOCKED_DETAIL: &str = "integrity violation detected - system is read-only";

impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Locked => StatusCode::LOCKED,
            LedgerError::IntegrityViolation { .. } => StatusCode::CONFLICT,
            LedgerError::EmptyChain | LedgerError::InvalidState(_) => StatusCode::CONFLICT,
            LedgerError::Witness { .. } => StatusCode::BAD_GATEWAY,
            LedgerError::Storage(_) | LedgerError::Config(_) | LedgerError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal failures and lock reasons never leave the process
        let detail = match &self {
            LedgerError::Locked => LOCKED_DETAIL.to_string(),
            LedgerError::Storage(_) | LedgerError::Config(_) | LedgerError::Serialization(_) => {
                error!("Request failed: {}", self);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": self.code(), "detail": detail }))).into_response()
    }
}
