use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::anchor::AnchorReport;
use crate::audit::{AuditFilter, LedgerEntry, RecordEvent, Verdict};
use crate::error::Result;
use crate::server::identity::{AdminCaller, Caller};
use crate::server::AppState;
use crate::service::Evidence;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "integrity-ledger",
        "timestamp": chrono::Utc::now()
    }))
}

/// Event body; the actor and role come from the caller identity
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub payload_before: Option<Value>,
    #[serde(default)]
    pub payload_after: Option<Value>,
    pub endpoint: String,
    pub method: String,
}

pub async fn record_event(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<EventRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let mut event = RecordEvent::new(&caller.actor, &caller.role, &body.action, &body.resource)
        .payloads(body.payload_before, body.payload_after)
        .via(&body.endpoint, &body.method);
    if let Some(id) = body.resource_id {
        event = event.resource_id(id);
    }

    let sequence = state.ledger.record_event(event).await?;
    Ok((StatusCode::CREATED, Json(json!({ "sequence": sequence }))))
}

pub async fn integrity(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "locked": state.ledger.is_locked().await }))
}

pub async fn verify(State(state): State<AppState>, _admin: AdminCaller) -> Result<Json<Verdict>> {
    Ok(Json(state.ledger.run_check().await?))
}

pub async fn events(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<Vec<LedgerEntry>>> {
    Ok(Json(state.ledger.list_events(&filter).await?))
}

pub async fn evidence(State(state): State<AppState>, _admin: AdminCaller) -> Result<Json<Evidence>> {
    Ok(Json(state.ledger.get_evidence().await?))
}

pub async fn anchor(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
) -> Result<Json<AnchorReport>> {
    Ok(Json(state.ledger.publish_anchor(&admin.actor).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub note: String,
}

pub async fn reset(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Json(body): Json<ResetRequest>,
) -> Result<Json<Value>> {
    let sequence = state.ledger.admin_reset(&admin.actor, &body.note).await?;
    Ok(Json(json!({ "status": "OK", "sequence": sequence })))
}
