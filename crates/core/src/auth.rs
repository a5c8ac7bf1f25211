use serde::{Deserialize, Serialize};

use crate::TenantId;

/// Acting user resolved for one request: who is asking and in which tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    subject: String,
    tenant_id: TenantId,
}

impl UserIdentity {
    /// Creates an identity from the authenticated subject and its tenant.
    #[must_use]
    pub fn new(subject: impl Into<String>, tenant_id: TenantId) -> Self {
        Self {
            subject: subject.into(),
            tenant_id,
        }
    }

    /// Returns the stable subject claim from the identity provider.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the tenant the subject acts in.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
