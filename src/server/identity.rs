//! Caller identity extractors.
//!
//! Authentication happens upstream; the authenticated identity arrives in
//! the `x-actor` and `x-role` headers.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub const ACTOR_HEADER: &str = "x-actor";
pub const ROLE_HEADER: &str = "x-role";
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub actor: String,
    pub role: String,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Caller whose role is `admin`
#[derive(Debug, Clone)]
pub struct AdminCaller(pub Caller);

#[derive(Debug)]
pub enum IdentityRejection {
    Missing,
    Forbidden,
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        match self {
            IdentityRejection::Missing => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthenticated", "detail": "caller identity missing" })),
            )
                .into_response(),
            IdentityRejection::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "forbidden", "detail": "admin role required" })),
            )
                .into_response(),
        }
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = header(parts, ACTOR_HEADER).ok_or(IdentityRejection::Missing)?;
        let role = header(parts, ROLE_HEADER).ok_or(IdentityRejection::Missing)?;
        Ok(Caller { actor, role })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminCaller
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        if caller.is_admin() {
            Ok(AdminCaller(caller))
        } else {
            Err(IdentityRejection::Forbidden)
        }
    }
}
