use std::sync::Arc;

use permisos_core::{AppError, AppResult, TenantId, UserIdentity};
use permisos_domain::{AbilityPredicate, AbilityRule, ActionId, ModuleId, ResourceInstance};
use tracing::{debug, warn};

use crate::AbilityCache;

/// The only interface views and handlers use to gate actions.
///
/// Every query fails closed: unknown subjects, unknown actions, malformed
/// identifiers and backend failures all answer `false`.
#[derive(Clone)]
pub struct AbilityService {
    cache: AbilityCache,
}

impl AbilityService {
    /// Creates the service on top of an ability cache.
    #[must_use]
    pub fn new(cache: AbilityCache) -> Self {
        Self { cache }
    }

    /// Answers whether the subject may perform `action` on `resource_type`.
    ///
    /// With an instance, the grant scope must also reach that record.
    pub async fn can(
        &self,
        identity: &UserIdentity,
        action: &str,
        resource_type: &str,
        instance: Option<&ResourceInstance>,
    ) -> bool {
        let Some((action, module)) = parse_query(action, resource_type) else {
            return false;
        };

        match self.cache.get_or_compile(identity).await {
            Ok(predicate) => predicate.allows(identity, &action, &module, instance),
            Err(error) => {
                warn!(
                    tenant_id = %identity.tenant_id(),
                    subject = %identity.subject(),
                    action = %action,
                    resource_type = %module,
                    error = %error,
                    "ability unavailable, denying"
                );
                false
            }
        }
    }

    /// Ensures the subject may perform `action` on `resource_type`.
    pub async fn require(
        &self,
        identity: &UserIdentity,
        action: &str,
        resource_type: &str,
        instance: Option<&ResourceInstance>,
    ) -> AppResult<()> {
        if self.can(identity, action, resource_type, instance).await {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "subject '{}' may not '{action}' on '{resource_type}' in tenant '{}'",
            identity.subject(),
            identity.tenant_id()
        )))
    }

    /// Returns a read-only ability handle for one request or render.
    pub async fn ability_for(&self, identity: &UserIdentity) -> AppResult<SubjectAbility> {
        let predicate = self.cache.get_or_compile(identity).await?;
        Ok(SubjectAbility::new(identity.clone(), predicate))
    }

    /// Reloads the subject role from the backend and returns the new handle.
    pub async fn refresh(&self, identity: &UserIdentity) -> AppResult<SubjectAbility> {
        let predicate = self.cache.refresh(identity).await?;
        Ok(SubjectAbility::new(identity.clone(), predicate))
    }

    /// Marks the subject ability stale after an out-of-band role change.
    pub async fn invalidate(&self, identity: &UserIdentity) {
        self.cache.invalidate(identity).await;
    }

    /// Marks every cached ability of a tenant stale.
    pub async fn invalidate_tenant(&self, tenant_id: TenantId) {
        self.cache.invalidate_tenant(tenant_id).await;
    }

    /// Drops all cached ability state of a subject, e.g. on sign-out.
    pub async fn evict(&self, identity: &UserIdentity) {
        self.cache.evict(identity).await;
    }
}

/// Compiled ability of one subject, borrowed for one request or render.
#[derive(Debug, Clone)]
pub struct SubjectAbility {
    identity: UserIdentity,
    predicate: Arc<AbilityPredicate>,
}

impl SubjectAbility {
    fn new(identity: UserIdentity, predicate: Arc<AbilityPredicate>) -> Self {
        Self {
            identity,
            predicate,
        }
    }

    /// Answers a query against the snapshot without touching the cache.
    #[must_use]
    pub fn can(
        &self,
        action: &str,
        resource_type: &str,
        instance: Option<&ResourceInstance>,
    ) -> bool {
        parse_query(action, resource_type).is_some_and(|(action, module)| {
            self.predicate
                .allows(&self.identity, &action, &module, instance)
        })
    }

    /// Returns the subject the handle was built for.
    #[must_use]
    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Returns the compiled rules, e.g. for shipping to the frontend.
    #[must_use]
    pub fn rules(&self) -> Vec<AbilityRule> {
        self.predicate.rules()
    }
}

fn parse_query(action: &str, resource_type: &str) -> Option<(ActionId, ModuleId)> {
    match (ActionId::new(action), ModuleId::new(resource_type)) {
        (Ok(action), Ok(module)) => Some((action, module)),
        _ => {
            debug!(action, resource_type, "malformed ability query, denying");
            None
        }
    }
}
