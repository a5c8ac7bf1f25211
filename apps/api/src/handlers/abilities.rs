use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use permisos_core::{AppResult, TenantId, UserIdentity};
use permisos_domain::ResourceInstance;

use crate::dto::{AbilityResponse, CanQuery, CanResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn my_ability_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<AbilityResponse>> {
    let ability = state.ability_service.ability_for(&user).await?;
    Ok(Json(AbilityResponse::from(ability)))
}

pub async fn can_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Query(query): Query<CanQuery>,
) -> ApiResult<Json<CanResponse>> {
    let instance = resource_instance_from_query(&user, &query)?;

    let allowed = state
        .ability_service
        .can(
            &user,
            query.action.as_str(),
            query.resource_type.as_str(),
            instance.as_ref(),
        )
        .await;

    Ok(Json(CanResponse { allowed }))
}

pub async fn refresh_ability_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<AbilityResponse>> {
    let ability = state.ability_service.refresh(&user).await?;
    Ok(Json(AbilityResponse::from(ability)))
}

pub async fn evict_ability_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> StatusCode {
    state.ability_service.evict(&user).await;
    StatusCode::NO_CONTENT
}

/// An owner subject without an owner tenant is taken to live in the caller tenant.
fn resource_instance_from_query(
    user: &UserIdentity,
    query: &CanQuery,
) -> AppResult<Option<ResourceInstance>> {
    let owner_tenant = query
        .owner_tenant_id
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(TenantId::parse)
        .transpose()?;
    let owner_subject = query
        .owner_subject
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    Ok(match (owner_tenant, owner_subject) {
        (None, None) => None,
        (Some(tenant_id), None) => Some(ResourceInstance::tenant_owned(tenant_id)),
        (owner_tenant, Some(subject)) => Some(ResourceInstance::subject_owned(
            owner_tenant.unwrap_or_else(|| user.tenant_id()),
            subject,
        )),
    })
}
