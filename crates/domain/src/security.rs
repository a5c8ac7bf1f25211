use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by role administration use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a role is created.
    RoleCreated,
    /// Emitted when the grant set of a role changes.
    RoleGrantsChanged,
    /// Emitted when a role is deleted.
    RoleDeleted,
    /// Emitted when a role is assigned to a subject.
    RoleAssigned,
    /// Emitted when a role is removed from a subject.
    RoleUnassigned,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "security.role.created",
            Self::RoleGrantsChanged => "security.role.grants_changed",
            Self::RoleDeleted => "security.role.deleted",
            Self::RoleAssigned => "security.role.assigned",
            Self::RoleUnassigned => "security.role.unassigned",
        }
    }
}
