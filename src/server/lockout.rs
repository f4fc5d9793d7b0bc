//! Lockout middleware: mutating requests are refused while the ledger
//! integrity is in doubt.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::LedgerError;
use crate::server::AppState;

pub fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

pub async fn reject_when_locked(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    if is_mutating(&method) && !state.is_allowed(&path) && state.ledger.is_locked().await {
        warn!("Rejected {} {} while locked", method, path);
        return LedgerError::Locked.into_response();
    }

    next.run(request).await
}
