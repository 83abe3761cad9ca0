//! Per-request identity context.
//!
//! The fronting session layer authenticates the browser session and
//! injects `x-user-id` (UUID) and `x-user-admin` headers before requests
//! reach this service. Handlers extract the context once and pass it
//! explicitly into every core operation; identity is never read from
//! ambient state.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::AppError;

/// Identity of the requesting principal, trusted as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub owner_id: Uuid,
    pub is_admin: bool,
}

impl RequestContext {
    /// True when `ctx` may mutate a resource owned by `owner_id`.
    pub fn can_modify(&self, owner_id: Uuid) -> bool {
        self.is_admin || self.owner_id == owner_id
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| AppError::unauthorized("missing or invalid x-user-id header"))?;

        let is_admin = parts
            .headers
            .get("x-user-admin")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(RequestContext { owner_id, is_admin })
    }
}
