use async_trait::async_trait;
use permisos_core::{AppResult, TenantId};
use permisos_domain::{Grant, Role};

/// Input payload for creating roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name in tenant scope.
    pub name: String,
    /// Grants to attach to the role.
    pub grants: Vec<Grant>,
}

/// Assignment projection mapping a subject to its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// Subject identifier.
    pub subject: String,
    /// Role identifier.
    pub role_id: String,
    /// Role name.
    pub role_name: String,
}

/// Repository port for role and assignment administration.
#[async_trait]
pub trait RoleAdminRepository: Send + Sync {
    /// Lists all tenant roles with their grants.
    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>>;

    /// Finds one role by id.
    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<Role>>;

    /// Creates a role; fails with `Conflict` when the name is taken.
    async fn create_role(&self, tenant_id: TenantId, input: CreateRoleInput) -> AppResult<Role>;

    /// Replaces the grant set of a role wholesale.
    async fn save_role_grants(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grants: &[Grant],
    ) -> AppResult<Role>;

    /// Appends one grant to a role.
    ///
    /// Implementations apply the edit atomically against the stored grant
    /// set, so concurrent edits of one role are never lost.
    async fn add_role_grant(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grant: &Grant,
    ) -> AppResult<Role>;

    /// Removes one grant from a role, atomically like `add_role_grant`.
    async fn remove_role_grant(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grant: &Grant,
    ) -> AppResult<Role>;

    /// Deletes a role; fails with `Conflict` while subjects reference it.
    async fn delete_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<()>;

    /// Assigns a role to a subject, replacing any previous assignment.
    async fn assign_role(&self, tenant_id: TenantId, subject: &str, role_id: &str)
    -> AppResult<()>;

    /// Removes the role assignment of a subject.
    async fn unassign_role(&self, tenant_id: TenantId, subject: &str) -> AppResult<()>;

    /// Lists subjects currently holding a role.
    async fn list_subjects_for_role(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> AppResult<Vec<String>>;

    /// Lists current role assignments in tenant scope.
    async fn list_role_assignments(&self, tenant_id: TenantId) -> AppResult<Vec<RoleAssignment>>;
}
