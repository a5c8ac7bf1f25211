use permisos_application::{CreateRoleInput, RoleAdminRepository};
use permisos_core::AppResult;
use permisos_domain::{Grant, GrantScope, ROLE_MANAGE_ACTION, ROLES_MODULE};
use tracing::info;

use crate::api_config::BootstrapAdmin;

pub(crate) const BOOTSTRAP_ROLE_NAME: &str = "Administrador";

/// Makes sure the configured subject can administer roles in its tenant.
///
/// Existing assignments of the subject are left untouched.
pub(crate) async fn ensure_bootstrap_admin(
    repository: &dyn RoleAdminRepository,
    admin: &BootstrapAdmin,
) -> AppResult<()> {
    let tenant_id = admin.tenant_id;

    let assignments = repository.list_role_assignments(tenant_id).await?;
    if assignments
        .iter()
        .any(|assignment| assignment.subject == admin.subject)
    {
        return Ok(());
    }

    let existing = repository
        .list_roles(tenant_id)
        .await?
        .into_iter()
        .find(|role| role.name() == BOOTSTRAP_ROLE_NAME);

    let role = match existing {
        Some(role) => role,
        None => {
            let grants = vec![
                Grant::parse(ROLES_MODULE, ROLE_MANAGE_ACTION, GrantScope::Tenant.as_str())?,
                Grant::parse("*", "*", GrantScope::Tenant.as_str())?,
            ];
            repository
                .create_role(
                    tenant_id,
                    CreateRoleInput {
                        name: BOOTSTRAP_ROLE_NAME.to_owned(),
                        grants,
                    },
                )
                .await?
        }
    };

    repository
        .assign_role(tenant_id, admin.subject.as_str(), role.role_id())
        .await?;

    info!(
        tenant_id = %tenant_id,
        subject = %admin.subject,
        role_id = %role.role_id(),
        "bootstrap administrator assigned"
    );

    Ok(())
}
