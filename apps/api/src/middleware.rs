use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use permisos_core::{AppError, AppResult, NonEmptyString, TenantId, UserIdentity};

use crate::error::ApiResult;
use crate::state::AppState;

pub const TENANT_HEADER: &str = "x-permisos-tenant-id";
pub const SUBJECT_HEADER: &str = "x-permisos-subject";

/// Authenticates the calling gateway and attaches the forwarded identity.
pub async fn require_gateway_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let headers = request.headers();

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("gateway credentials required".to_owned()))?;

    if !constant_time_eq(
        presented.as_bytes(),
        state.gateway_shared_secret.as_bytes(),
    ) {
        return Err(AppError::Unauthorized("invalid gateway credentials".to_owned()).into());
    }

    let identity = identity_from_headers(headers)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn identity_from_headers(headers: &HeaderMap) -> AppResult<UserIdentity> {
    let tenant_id = headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("{TENANT_HEADER} header is required")))
        .and_then(TenantId::parse)?;

    let subject = headers
        .get(SUBJECT_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("{SUBJECT_HEADER} header is required")))?;
    let subject = NonEmptyString::new(subject)?;

    Ok(UserIdentity::new(subject.as_str(), tenant_id))
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.iter()
        .zip(right)
        .fold(0_u8, |difference, (left, right)| difference | (left ^ right))
        == 0
}
