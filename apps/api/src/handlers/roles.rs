use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use permisos_application::CreateRoleInput;
use permisos_core::UserIdentity;

use crate::dto::{
    AssignRoleRequest, CreateRoleRequest, GrantDto, RemoveRoleAssignmentRequest,
    ReplaceGrantsRequest, RoleAssignmentResponse, RoleResponse, grants_from_dtos,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_roles_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    let roles = state
        .role_admin_service
        .list_roles(&user)
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(roles))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    let grants = grants_from_dtos(&payload.grants)?;

    let role = state
        .role_admin_service
        .create_role(
            &user,
            CreateRoleInput {
                name: payload.name,
                grants,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(role_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .role_admin_service
        .delete_role(&user, role_id.as_str())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace_grants_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(role_id): Path<String>,
    Json(payload): Json<ReplaceGrantsRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let grants = grants_from_dtos(&payload.grants)?;

    let role = state
        .role_admin_service
        .replace_grants(&user, role_id.as_str(), grants)
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn add_grant_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(role_id): Path<String>,
    Json(payload): Json<GrantDto>,
) -> ApiResult<Json<RoleResponse>> {
    let grant = payload.to_grant()?;

    let role = state
        .role_admin_service
        .add_grant(&user, role_id.as_str(), grant)
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn remove_grant_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(role_id): Path<String>,
    Json(payload): Json<GrantDto>,
) -> ApiResult<Json<RoleResponse>> {
    let grant = payload.to_grant()?;

    let role = state
        .role_admin_service
        .remove_grant(&user, role_id.as_str(), &grant)
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn list_role_assignments_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<Vec<RoleAssignmentResponse>>> {
    let assignments = state
        .role_admin_service
        .list_role_assignments(&user)
        .await?
        .into_iter()
        .map(RoleAssignmentResponse::from)
        .collect();

    Ok(Json(assignments))
}

pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<StatusCode> {
    state
        .role_admin_service
        .assign_role(&user, payload.subject.as_str(), payload.role_id.as_str())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unassign_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<RemoveRoleAssignmentRequest>,
) -> ApiResult<StatusCode> {
    state
        .role_admin_service
        .unassign_role(&user, payload.subject.as_str())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
