use permisos_application::{RoleAssignment, SubjectAbility};
use permisos_core::AppResult;
use permisos_domain::{AbilityRule, Grant, Role};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub postgres: &'static str,
}

/// One compiled allow rule, in the shape frontend ability checks expect.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/ability-rule-response.ts"
)]
pub struct AbilityRuleResponse {
    pub module: String,
    pub action: String,
    pub scope: String,
}

impl From<AbilityRule> for AbilityRuleResponse {
    fn from(value: AbilityRule) -> Self {
        Self {
            module: value.module.into(),
            action: value.action.into(),
            scope: value.scope.as_str().to_owned(),
        }
    }
}

/// Compiled ability of the calling subject.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/ability-response.ts"
)]
pub struct AbilityResponse {
    pub tenant_id: String,
    pub subject: String,
    pub rules: Vec<AbilityRuleResponse>,
}

impl From<SubjectAbility> for AbilityResponse {
    fn from(value: SubjectAbility) -> Self {
        Self {
            tenant_id: value.identity().tenant_id().to_string(),
            subject: value.identity().subject().to_owned(),
            rules: value
                .rules()
                .into_iter()
                .map(AbilityRuleResponse::from)
                .collect(),
        }
    }
}

/// Query string of an ability check.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/can-query.ts"
)]
pub struct CanQuery {
    pub action: String,
    pub resource_type: String,
    pub owner_tenant_id: Option<String>,
    pub owner_subject: Option<String>,
}

/// Answer of an ability check.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/can-response.ts"
)]
pub struct CanResponse {
    pub allowed: bool,
}

/// Grant payload used in requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/grant-dto.ts"
)]
pub struct GrantDto {
    pub module: String,
    pub action: String,
    pub scope: String,
}

impl GrantDto {
    pub fn to_grant(&self) -> AppResult<Grant> {
        Grant::parse(
            self.module.as_str(),
            self.action.as_str(),
            self.scope.as_str(),
        )
    }
}

impl From<&Grant> for GrantDto {
    fn from(value: &Grant) -> Self {
        Self {
            module: value.module().as_str().to_owned(),
            action: value.action().as_str().to_owned(),
            scope: value.scope().as_str().to_owned(),
        }
    }
}

/// Incoming payload for role creation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-role-request.ts"
)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub grants: Vec<GrantDto>,
}

/// Incoming payload replacing the grant set of a role.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/replace-grants-request.ts"
)]
pub struct ReplaceGrantsRequest {
    pub grants: Vec<GrantDto>,
}

/// API representation of a role.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/role-response.ts"
)]
pub struct RoleResponse {
    pub role_id: String,
    pub name: String,
    pub grants: Vec<GrantDto>,
}

impl From<Role> for RoleResponse {
    fn from(value: Role) -> Self {
        Self {
            role_id: value.role_id().to_owned(),
            name: value.name().to_owned(),
            grants: value.grants().iter().map(GrantDto::from).collect(),
        }
    }
}

/// Incoming payload for assigning a role to a subject.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/assign-role-request.ts"
)]
pub struct AssignRoleRequest {
    pub subject: String,
    pub role_id: String,
}

/// Incoming payload for removing the role of a subject.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/remove-role-assignment-request.ts"
)]
pub struct RemoveRoleAssignmentRequest {
    pub subject: String,
}

/// API representation of a role assignment.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/role-assignment-response.ts"
)]
pub struct RoleAssignmentResponse {
    pub subject: String,
    pub role_id: String,
    pub role_name: String,
}

impl From<RoleAssignment> for RoleAssignmentResponse {
    fn from(value: RoleAssignment) -> Self {
        Self {
            subject: value.subject,
            role_id: value.role_id,
            role_name: value.role_name,
        }
    }
}

/// Converts transport grants into validated domain grants.
pub fn grants_from_dtos(values: &[GrantDto]) -> AppResult<Vec<Grant>> {
    values.iter().map(GrantDto::to_grant).collect()
}
