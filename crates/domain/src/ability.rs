use std::collections::BTreeMap;

use permisos_core::{TenantId, UserIdentity};
use serde::{Deserialize, Serialize};

use crate::{ActionId, GrantScope, ModuleId, Role};

/// Record a query is evaluated against, described by who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceInstance {
    /// Tenant the record belongs to.
    pub owner_tenant: TenantId,
    /// Subject that owns the record, when the record has a personal owner.
    pub owner_subject: Option<String>,
}

impl ResourceInstance {
    /// Creates an instance owned by a tenant without a personal owner.
    #[must_use]
    pub fn tenant_owned(owner_tenant: TenantId) -> Self {
        Self {
            owner_tenant,
            owner_subject: None,
        }
    }

    /// Creates an instance owned by one subject of a tenant.
    #[must_use]
    pub fn subject_owned(owner_tenant: TenantId, owner_subject: impl Into<String>) -> Self {
        Self {
            owner_tenant,
            owner_subject: Some(owner_subject.into()),
        }
    }

    fn is_reachable(&self, identity: &UserIdentity, scope: GrantScope) -> bool {
        if self.owner_tenant != identity.tenant_id() {
            return false;
        }

        match scope {
            GrantScope::Tenant => true,
            GrantScope::Own => self.owner_subject.as_deref() == Some(identity.subject()),
        }
    }
}

/// One compiled allow rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityRule {
    /// Module the rule applies to, possibly the wildcard.
    pub module: ModuleId,
    /// Action the rule applies to, possibly the wildcard.
    pub action: ActionId,
    /// Broadest scope granted for the pair.
    pub scope: GrantScope,
}

/// Compiled, read-only decision structure derived from one role.
///
/// Every `(module, action)` pair absent from the rule map is denied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbilityPredicate {
    tenant_id: Option<TenantId>,
    rules: BTreeMap<(ModuleId, ActionId), GrantScope>,
}

impl AbilityPredicate {
    /// Returns the predicate of a subject without any role.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compiles a role into a predicate.
    ///
    /// Grants sharing a `(module, action)` pair collapse into the broadest scope.
    #[must_use]
    pub fn compile(role: &Role) -> Self {
        let mut rules: BTreeMap<(ModuleId, ActionId), GrantScope> = BTreeMap::new();

        for grant in role.grants() {
            rules
                .entry((grant.module().clone(), grant.action().clone()))
                .and_modify(|scope| *scope = scope.broadest(grant.scope()))
                .or_insert(grant.scope());
        }

        Self {
            tenant_id: Some(role.tenant_id()),
            rules,
        }
    }

    /// Returns whether the predicate grants nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the tenant of the compiled role.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Returns the compiled rules in stable order.
    #[must_use]
    pub fn rules(&self) -> Vec<AbilityRule> {
        self.rules
            .iter()
            .map(|((module, action), scope)| AbilityRule {
                module: module.clone(),
                action: action.clone(),
                scope: *scope,
            })
            .collect()
    }

    /// Returns the broadest scope allowed for an action on a module.
    ///
    /// Exact rules and wildcard rules are all consulted.
    #[must_use]
    pub fn allowed_scope(&self, action: &ActionId, module: &ModuleId) -> Option<GrantScope> {
        let any_module = ModuleId::wildcard();
        let any_action = ActionId::wildcard();

        [
            (module, action),
            (&any_module, action),
            (module, &any_action),
            (&any_module, &any_action),
        ]
        .into_iter()
        .filter_map(|(module, action)| self.rules.get(&(module.clone(), action.clone())))
        .copied()
        .max()
    }

    /// Answers whether the identity may perform `action` on `module`.
    ///
    /// Without an instance the answer covers "at least some records of the
    /// module"; with an instance the grant scope must reach that record.
    #[must_use]
    pub fn allows(
        &self,
        identity: &UserIdentity,
        action: &ActionId,
        module: &ModuleId,
        instance: Option<&ResourceInstance>,
    ) -> bool {
        if self.tenant_id != Some(identity.tenant_id()) {
            return false;
        }

        let Some(scope) = self.allowed_scope(action, module) else {
            return false;
        };

        instance.is_none_or(|instance| instance.is_reachable(identity, scope))
    }
}
