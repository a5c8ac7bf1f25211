use std::collections::HashMap;

use async_trait::async_trait;
use permisos_application::{
    CreateRoleInput, PermissionSource, RawGrant, RoleAdminRepository, RoleAssignment, RoleRecord,
};
use permisos_core::{AppError, AppResult, TenantId};
use permisos_domain::{Grant, Role};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory role repository, serving both administration and lookups.
///
/// Locks are always taken `roles` before `assignments`.
#[derive(Debug, Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<HashMap<(TenantId, String), Role>>,
    assignments: RwLock<HashMap<(TenantId, String), String>>,
}

impl InMemoryRoleRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an edit to a stored role while holding the write lock.
    async fn edit_role(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        edit: impl FnOnce(&Role) -> Role + Send,
    ) -> AppResult<Role> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(&(tenant_id, role_id.to_owned()))
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;

        *role = edit(role);
        Ok(role.clone())
    }
}

#[async_trait]
impl PermissionSource for InMemoryRoleRepository {
    async fn find_role_for_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<RoleRecord>> {
        let roles = self.roles.read().await;
        let assignments = self.assignments.read().await;
        let Some(role_id) = assignments.get(&(tenant_id, subject.to_owned())) else {
            return Ok(None);
        };

        Ok(roles
            .get(&(tenant_id, role_id.clone()))
            .map(role_record))
    }
}

#[async_trait]
impl RoleAdminRepository for InMemoryRoleRepository {
    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>> {
        let roles = self.roles.read().await;

        let mut values: Vec<Role> = roles
            .iter()
            .filter_map(|((stored_tenant_id, _), role)| {
                (*stored_tenant_id == tenant_id).then(|| role.clone())
            })
            .collect();
        values.sort_by(|left, right| left.name().cmp(right.name()));

        Ok(values)
    }

    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .get(&(tenant_id, role_id.to_owned()))
            .cloned())
    }

    async fn create_role(&self, tenant_id: TenantId, input: CreateRoleInput) -> AppResult<Role> {
        let mut roles = self.roles.write().await;
        let name = input.name.trim();

        if roles
            .values()
            .any(|role| role.tenant_id() == tenant_id && role.name() == name)
        {
            return Err(AppError::Conflict(format!(
                "role '{name}' already exists for tenant '{tenant_id}'"
            )));
        }

        let role = Role::new(Uuid::new_v4().to_string(), name, tenant_id, input.grants)?;
        roles.insert((tenant_id, role.role_id().to_owned()), role.clone());

        Ok(role)
    }

    async fn save_role_grants(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grants: &[Grant],
    ) -> AppResult<Role> {
        self.edit_role(tenant_id, role_id, |role| role.with_grants(grants.to_vec()))
            .await
    }

    async fn add_role_grant(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grant: &Grant,
    ) -> AppResult<Role> {
        self.edit_role(tenant_id, role_id, |role| role.with_added_grant(grant.clone()))
            .await
    }

    async fn remove_role_grant(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grant: &Grant,
    ) -> AppResult<Role> {
        self.edit_role(tenant_id, role_id, |role| role.with_removed_grant(grant))
            .await
    }

    async fn delete_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        let assignments = self.assignments.read().await;

        if assignments
            .iter()
            .any(|((stored_tenant_id, _), assigned)| {
                *stored_tenant_id == tenant_id && assigned == role_id
            })
        {
            return Err(AppError::Conflict(format!(
                "role '{role_id}' is still assigned"
            )));
        }

        roles
            .remove(&(tenant_id, role_id.to_owned()))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    async fn assign_role(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &str,
    ) -> AppResult<()> {
        let roles = self.roles.read().await;
        if !roles.contains_key(&(tenant_id, role_id.to_owned())) {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        self.assignments
            .write()
            .await
            .insert((tenant_id, subject.to_owned()), role_id.to_owned());

        Ok(())
    }

    async fn unassign_role(&self, tenant_id: TenantId, subject: &str) -> AppResult<()> {
        self.assignments
            .write()
            .await
            .remove(&(tenant_id, subject.to_owned()))
            .map(|_| ())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "subject '{subject}' has no role in tenant '{tenant_id}'"
                ))
            })
    }

    async fn list_subjects_for_role(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> AppResult<Vec<String>> {
        let assignments = self.assignments.read().await;

        let mut subjects: Vec<String> = assignments
            .iter()
            .filter_map(|((stored_tenant_id, subject), assigned)| {
                (*stored_tenant_id == tenant_id && assigned == role_id).then(|| subject.clone())
            })
            .collect();
        subjects.sort();

        Ok(subjects)
    }

    async fn list_role_assignments(&self, tenant_id: TenantId) -> AppResult<Vec<RoleAssignment>> {
        let roles = self.roles.read().await;
        let assignments = self.assignments.read().await;

        let mut values: Vec<RoleAssignment> = assignments
            .iter()
            .filter(|((stored_tenant_id, _), _)| *stored_tenant_id == tenant_id)
            .filter_map(|((_, subject), role_id)| {
                roles
                    .get(&(tenant_id, role_id.clone()))
                    .map(|role| RoleAssignment {
                        subject: subject.clone(),
                        role_id: role_id.clone(),
                        role_name: role.name().to_owned(),
                    })
            })
            .collect();
        values.sort_by(|left, right| left.subject.cmp(&right.subject));

        Ok(values)
    }
}

fn role_record(role: &Role) -> RoleRecord {
    RoleRecord {
        role_id: role.role_id().to_owned(),
        name: role.name().to_owned(),
        tenant_id: role.tenant_id(),
        grants: role
            .grants()
            .iter()
            .map(|grant| {
                RawGrant::new(
                    grant.module().as_str(),
                    grant.action().as_str(),
                    grant.scope().as_str(),
                )
            })
            .collect(),
    }
}
