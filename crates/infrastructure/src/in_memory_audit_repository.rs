use async_trait::async_trait;
use permisos_application::{AuditEvent, AuditRepository};
use permisos_core::{AppResult, TenantId};
use tokio::sync::RwLock;
use tracing::info;

/// In-memory append-only audit log used by the memory backend.
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditRepository {
    /// Creates an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events recorded for a tenant, oldest first.
    pub async fn events_for_tenant(&self, tenant_id: TenantId) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        info!(
            tenant_id = %event.tenant_id,
            subject = %event.subject,
            action = event.action.as_str(),
            resource_id = %event.resource_id,
            "audit event recorded"
        );

        self.events.write().await.push(event);
        Ok(())
    }
}
