//! Tenant extractor for task feed handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use taskfeed_core::types::{DbId, TenantContext};

use crate::error::AppError;

/// Organization header set by the upstream gateway.
pub const ORGANIZATION_HEADER: &str = "x-organization-id";
/// Acting user header set by the upstream gateway.
pub const USER_HEADER: &str = "x-user-id";

/// The caller's organization and user, read from gateway headers.
///
/// Authentication happens upstream; requests without both headers are
/// rejected with 401.
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub TenantContext);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        tenant_from_headers(&parts.headers).map(Tenant)
    }
}

pub fn tenant_from_headers(headers: &HeaderMap) -> Result<TenantContext, AppError> {
    let organization_id = id_header(headers, ORGANIZATION_HEADER)?;
    let user_id = id_header(headers, USER_HEADER)?;
    Ok(TenantContext::new(organization_id, user_id))
}

fn id_header(headers: &HeaderMap, name: &str) -> Result<DbId, AppError> {
    let value = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {name} header")))?;

    value
        .trim()
        .parse::<DbId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Unauthorized(format!("Invalid {name} header")))
}
