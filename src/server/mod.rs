//! HTTP surface of the ledger.

pub mod error;
pub mod handlers;
pub mod identity;
pub mod lockout;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::service::AuditLedger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: AuditLedger,
    allow_paths: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(ledger: AuditLedger, allow_paths: Vec<String>) -> Self {
        Self {
            ledger,
            allow_paths: Arc::new(allow_paths),
        }
    }

    /// Paths served even while locked, matched exactly
    pub fn is_allowed(&self, path: &str) -> bool {
        self.allow_paths.iter().any(|allowed| allowed == path)
    }
}

pub fn router(state: AppState) -> Router {
    with_routes(state, Router::new())
}

/// Ledger routes plus a collaborator's own routes, all behind the lockout
pub fn with_routes(state: AppState, routes: Router<AppState>) -> Router {
    routes
        .route("/health", get(handlers::health_check))
        .route("/events", post(handlers::record_event))
        .route("/integrity", get(handlers::integrity))
        .route("/admin/audit/verify", post(handlers::verify))
        .route("/admin/audit/events", get(handlers::events))
        .route("/admin/audit/evidence", get(handlers::evidence))
        .route("/admin/audit/anchor", post(handlers::anchor))
        .route("/admin/audit/reset", post(handlers::reset))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    lockout::reject_when_locked,
                ))
                .into_inner(),
        )
        .with_state(state)
}
