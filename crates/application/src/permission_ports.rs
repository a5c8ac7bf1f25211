use async_trait::async_trait;
use permisos_core::{AppResult, TenantId};

/// Unvalidated grant row as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGrant {
    /// Module identifier.
    pub module: String,
    /// Action identifier.
    pub action: String,
    /// Scope qualifier (`own` or `tenant`).
    pub scope: String,
}

impl RawGrant {
    /// Creates a raw grant row.
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        action: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            action: action.into(),
            scope: scope.into(),
        }
    }
}

/// Role assigned to a subject, with its raw grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    /// Stable role identifier.
    pub role_id: String,
    /// Role display name.
    pub name: String,
    /// Tenant the role belongs to.
    pub tenant_id: TenantId,
    /// Grants in backend order.
    pub grants: Vec<RawGrant>,
}

/// Backend collaborator answering "which role does this subject hold".
///
/// Adapters report unreachable backends as `AppError::Transport`.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Returns the role of a subject in a tenant, or `None` without one.
    async fn find_role_for_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<RoleRecord>>;
}
