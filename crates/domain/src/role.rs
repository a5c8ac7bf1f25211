use permisos_core::{AppResult, NonEmptyString, TenantId};
use serde::{Deserialize, Serialize};

use crate::Grant;

/// Module guarding role administration itself.
pub const ROLES_MODULE: &str = "roles";

/// Action required on [`ROLES_MODULE`] to mutate roles and assignments.
pub const ROLE_MANAGE_ACTION: &str = "gestionar";

/// Tenant-scoped role holding an ordered, duplicate-free set of grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    role_id: String,
    name: NonEmptyString,
    tenant_id: TenantId,
    grants: Vec<Grant>,
}

impl Role {
    /// Creates a role. Repeated grants keep their first position only.
    pub fn new(
        role_id: impl Into<String>,
        name: impl Into<String>,
        tenant_id: TenantId,
        grants: Vec<Grant>,
    ) -> AppResult<Self> {
        let role_id = NonEmptyString::new(role_id)?;

        Ok(Self {
            role_id: role_id.into(),
            name: NonEmptyString::new(name)?,
            tenant_id,
            grants: dedup_grants(grants),
        })
    }

    /// Returns the stable role identifier.
    #[must_use]
    pub fn role_id(&self) -> &str {
        self.role_id.as_str()
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the tenant this role applies to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the grants in insertion order.
    #[must_use]
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Returns a copy of this role with the grant set replaced wholesale.
    #[must_use]
    pub fn with_grants(&self, grants: Vec<Grant>) -> Self {
        Self {
            grants: dedup_grants(grants),
            ..self.clone()
        }
    }

    /// Returns a copy of this role with one more grant appended.
    #[must_use]
    pub fn with_added_grant(&self, grant: Grant) -> Self {
        let mut grants = self.grants.clone();
        grants.push(grant);
        self.with_grants(grants)
    }

    /// Returns a copy of this role without the given grant.
    #[must_use]
    pub fn with_removed_grant(&self, grant: &Grant) -> Self {
        self.with_grants(
            self.grants
                .iter()
                .filter(|value| *value != grant)
                .cloned()
                .collect(),
        )
    }
}

fn dedup_grants(grants: Vec<Grant>) -> Vec<Grant> {
    let mut unique: Vec<Grant> = Vec::with_capacity(grants.len());
    for grant in grants {
        if !unique.contains(&grant) {
            unique.push(grant);
        }
    }
    unique
}
