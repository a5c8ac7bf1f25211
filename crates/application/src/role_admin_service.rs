use std::sync::Arc;

use permisos_core::{AppError, AppResult, NonEmptyString, UserIdentity};
use permisos_domain::{AuditAction, Grant, ROLE_MANAGE_ACTION, ROLES_MODULE, ResourceInstance, Role};
use tracing::{info, warn};

use crate::{
    AbilityService, AuditEvent, AuditRepository, CreateRoleInput, RoleAdminRepository,
    RoleAssignment,
};

/// Application service for role and assignment administration.
///
/// Every mutation invalidates the cached abilities of all affected
/// subjects before it returns.
#[derive(Clone)]
pub struct RoleAdminService {
    ability_service: AbilityService,
    repository: Arc<dyn RoleAdminRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RoleAdminService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        ability_service: AbilityService,
        repository: Arc<dyn RoleAdminRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            ability_service,
            repository,
            audit_repository,
        }
    }

    /// Returns tenant roles for administrative users.
    pub async fn list_roles(&self, actor: &UserIdentity) -> AppResult<Vec<Role>> {
        self.require_role_manage_permission(actor).await?;
        self.repository.list_roles(actor.tenant_id()).await
    }

    /// Returns role assignments for administrative users.
    pub async fn list_role_assignments(
        &self,
        actor: &UserIdentity,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.require_role_manage_permission(actor).await?;
        self.repository
            .list_role_assignments(actor.tenant_id())
            .await
    }

    /// Creates a role and emits an audit event.
    pub async fn create_role(
        &self,
        actor: &UserIdentity,
        input: CreateRoleInput,
    ) -> AppResult<Role> {
        self.require_role_manage_permission(actor).await?;
        let name = NonEmptyString::new(input.name)?;

        let role = self
            .repository
            .create_role(
                actor.tenant_id(),
                CreateRoleInput {
                    name: name.into(),
                    grants: input.grants,
                },
            )
            .await?;

        self.append_audit_event(
            actor,
            AuditAction::RoleCreated,
            "rbac_role",
            role.role_id().to_owned(),
            format!(
                "created role '{}' with {} grants",
                role.name(),
                role.grants().len()
            ),
        )
        .await?;

        Ok(role)
    }

    /// Appends one grant to a role.
    pub async fn add_grant(
        &self,
        actor: &UserIdentity,
        role_id: &str,
        grant: Grant,
    ) -> AppResult<Role> {
        self.update_grants(actor, role_id, GrantEdit::Add(&grant))
            .await
    }

    /// Removes one grant from a role.
    pub async fn remove_grant(
        &self,
        actor: &UserIdentity,
        role_id: &str,
        grant: &Grant,
    ) -> AppResult<Role> {
        self.update_grants(actor, role_id, GrantEdit::Remove(grant))
            .await
    }

    /// Replaces the grant set of a role wholesale.
    pub async fn replace_grants(
        &self,
        actor: &UserIdentity,
        role_id: &str,
        grants: Vec<Grant>,
    ) -> AppResult<Role> {
        self.update_grants(actor, role_id, GrantEdit::Replace(&grants))
            .await
    }

    /// Deletes a role no subject references anymore.
    pub async fn delete_role(&self, actor: &UserIdentity, role_id: &str) -> AppResult<()> {
        self.require_role_manage_permission(actor).await?;
        let role = self.find_role(actor, role_id).await?;

        let subjects = self
            .repository
            .list_subjects_for_role(actor.tenant_id(), role_id)
            .await?;
        if !subjects.is_empty() {
            return Err(AppError::Conflict(format!(
                "role '{}' is still assigned to {} subjects",
                role.name(),
                subjects.len()
            )));
        }

        self.repository
            .delete_role(actor.tenant_id(), role_id)
            .await?;

        self.append_audit_event(
            actor,
            AuditAction::RoleDeleted,
            "rbac_role",
            role_id.to_owned(),
            format!("deleted role '{}'", role.name()),
        )
        .await
    }

    /// Assigns a role to a subject, replacing its previous role.
    pub async fn assign_role(
        &self,
        actor: &UserIdentity,
        subject: &str,
        role_id: &str,
    ) -> AppResult<()> {
        self.require_role_manage_permission(actor).await?;
        let subject = NonEmptyString::new(subject)?;
        let role = self.find_role(actor, role_id).await?;

        self.repository
            .assign_role(actor.tenant_id(), subject.as_str(), role_id)
            .await?;
        self.ability_service
            .invalidate(&UserIdentity::new(subject.as_str(), actor.tenant_id()))
            .await;

        self.append_audit_event(
            actor,
            AuditAction::RoleAssigned,
            "rbac_subject_role",
            format!("{subject}:{role_id}"),
            format!("assigned role '{}' to '{subject}'", role.name()),
        )
        .await
    }

    /// Removes the role of a subject, leaving it without capabilities.
    pub async fn unassign_role(&self, actor: &UserIdentity, subject: &str) -> AppResult<()> {
        self.require_role_manage_permission(actor).await?;
        let subject = NonEmptyString::new(subject)?;

        self.repository
            .unassign_role(actor.tenant_id(), subject.as_str())
            .await?;
        self.ability_service
            .invalidate(&UserIdentity::new(subject.as_str(), actor.tenant_id()))
            .await;

        self.append_audit_event(
            actor,
            AuditAction::RoleUnassigned,
            "rbac_subject_role",
            subject.to_string(),
            format!("removed role from '{subject}'"),
        )
        .await
    }

    async fn update_grants(
        &self,
        actor: &UserIdentity,
        role_id: &str,
        edit: GrantEdit<'_>,
    ) -> AppResult<Role> {
        self.require_role_manage_permission(actor).await?;
        let tenant_id = actor.tenant_id();

        let (saved, change) = match edit {
            GrantEdit::Add(grant) => (
                self.repository
                    .add_role_grant(tenant_id, role_id, grant)
                    .await?,
                format!("added grant {}", describe_grant(grant)),
            ),
            GrantEdit::Remove(grant) => (
                self.repository
                    .remove_role_grant(tenant_id, role_id, grant)
                    .await?,
                format!("removed grant {}", describe_grant(grant)),
            ),
            GrantEdit::Replace(grants) => (
                self.repository
                    .save_role_grants(tenant_id, role_id, grants)
                    .await?,
                format!("replaced grants with {} entries", grants.len()),
            ),
        };

        // The change is persisted: holders must not keep the old predicate.
        let subjects = match self
            .repository
            .list_subjects_for_role(tenant_id, role_id)
            .await
        {
            Ok(subjects) => subjects,
            Err(error) => {
                self.ability_service.invalidate_tenant(tenant_id).await;
                warn!(
                    tenant_id = %tenant_id,
                    role_id = %role_id,
                    error = %error,
                    "role holders unavailable, invalidated every ability of the tenant"
                );
                return Err(error);
            }
        };
        for subject in &subjects {
            self.ability_service
                .invalidate(&UserIdentity::new(subject.as_str(), tenant_id))
                .await;
        }

        info!(
            tenant_id = %tenant_id,
            role_id = %role_id,
            grant_count = saved.grants().len(),
            invalidated_subjects = subjects.len(),
            "role grants updated"
        );

        self.append_audit_event(
            actor,
            AuditAction::RoleGrantsChanged,
            "rbac_role",
            role_id.to_owned(),
            format!("role '{}': {change}", saved.name()),
        )
        .await?;

        Ok(saved)
    }

    async fn find_role(&self, actor: &UserIdentity, role_id: &str) -> AppResult<Role> {
        self.repository
            .find_role(actor.tenant_id(), role_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "role '{role_id}' does not exist in tenant '{}'",
                    actor.tenant_id()
                ))
            })
    }

    async fn require_role_manage_permission(&self, actor: &UserIdentity) -> AppResult<()> {
        self.ability_service
            .require(
                actor,
                ROLE_MANAGE_ACTION,
                ROLES_MODULE,
                Some(&ResourceInstance::tenant_owned(actor.tenant_id())),
            )
            .await
    }

    async fn append_audit_event(
        &self,
        actor: &UserIdentity,
        action: AuditAction,
        resource_type: &str,
        resource_id: String,
        detail: String,
    ) -> AppResult<()> {
        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action,
                resource_type: resource_type.to_owned(),
                resource_id,
                detail: Some(detail),
            })
            .await
    }
}

enum GrantEdit<'a> {
    Add(&'a Grant),
    Remove(&'a Grant),
    Replace(&'a [Grant]),
}

fn describe_grant(grant: &Grant) -> String {
    format!(
        "({}, {}, {})",
        grant.module(),
        grant.action(),
        grant.scope()
    )
}
