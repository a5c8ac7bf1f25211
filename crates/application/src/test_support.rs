use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use permisos_core::{AppError, AppResult, TenantId, UserIdentity};
use permisos_domain::{Grant, Role};
use tokio::sync::Mutex;

use crate::{
    AbilityCache, AbilityService, AuditEvent, AuditRepository, CreateRoleInput, PermissionSource,
    PermissionStore, RawGrant, RoleAdminRepository, RoleAssignment, RoleRecord,
};

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditRepository for FakeAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
struct BackendState {
    roles: HashMap<(TenantId, String), Role>,
    assignments: HashMap<(TenantId, String), String>,
    next_role_id: usize,
}

/// Role backend fake serving both the permission source and admin ports.
#[derive(Default)]
pub(crate) struct FakeRoleBackend {
    state: Mutex<BackendState>,
    raw_overrides: Mutex<HashMap<(TenantId, String), RoleRecord>>,
    unreachable: AtomicBool,
    subject_listing_fails: AtomicBool,
    fetch_delay_ms: AtomicUsize,
    pub(crate) fetch_count: AtomicUsize,
}

impl FakeRoleBackend {
    pub(crate) async fn seed_role(&self, tenant_id: TenantId, name: &str, grants: &[Grant]) -> Role {
        let mut state = self.state.lock().await;
        state.next_role_id += 1;
        let role = Role::new(
            format!("role-{}", state.next_role_id),
            name,
            tenant_id,
            grants.to_vec(),
        )
        .unwrap_or_else(|error| panic!("invalid seeded role: {error}"));
        state
            .roles
            .insert((tenant_id, role.role_id().to_owned()), role.clone());
        role
    }

    pub(crate) async fn seed_assignment(&self, identity: &UserIdentity, role_id: &str) {
        self.state.lock().await.assignments.insert(
            (identity.tenant_id(), identity.subject().to_owned()),
            role_id.to_owned(),
        );
    }

    pub(crate) async fn override_raw(&self, identity: &UserIdentity, record: RoleRecord) {
        self.raw_overrides.lock().await.insert(
            (identity.tenant_id(), identity.subject().to_owned()),
            record,
        );
    }

    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub(crate) fn set_subject_listing_failure(&self, fails: bool) {
        self.subject_listing_fails.store(fails, Ordering::SeqCst);
    }

    pub(crate) fn set_fetch_delay(&self, delay: Duration) {
        let millis = usize::try_from(delay.as_millis()).unwrap_or(usize::MAX);
        self.fetch_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionSource for FakeRoleBackend {
    async fn find_role_for_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<RoleRecord>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        // Snapshot before the simulated latency so late mutations stay invisible.
        let result = self.snapshot(tenant_id, subject).await;

        let delay_ms = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        }

        result
    }
}

impl FakeRoleBackend {
    async fn edit_role(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        edit: impl FnOnce(&Role) -> Role + Send,
    ) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        let role = state
            .roles
            .get_mut(&(tenant_id, role_id.to_owned()))
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;
        *role = edit(role);
        Ok(role.clone())
    }

    async fn snapshot(&self, tenant_id: TenantId, subject: &str) -> AppResult<Option<RoleRecord>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::Transport("backend unreachable".to_owned()));
        }

        let key = (tenant_id, subject.to_owned());
        if let Some(record) = self.raw_overrides.lock().await.get(&key) {
            return Ok(Some(record.clone()));
        }

        let state = self.state.lock().await;
        let Some(role_id) = state.assignments.get(&key) else {
            return Ok(None);
        };

        Ok(state
            .roles
            .get(&(tenant_id, role_id.clone()))
            .map(|role| RoleRecord {
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
            }))
    }
}

#[async_trait]
impl RoleAdminRepository for FakeRoleBackend {
    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>> {
        let state = self.state.lock().await;
        let mut roles: Vec<Role> = state
            .roles
            .iter()
            .filter(|((role_tenant, _), _)| *role_tenant == tenant_id)
            .map(|(_, role)| role.clone())
            .collect();
        roles.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(roles)
    }

    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<Role>> {
        Ok(self
            .state
            .lock()
            .await
            .roles
            .get(&(tenant_id, role_id.to_owned()))
            .cloned())
    }

    async fn create_role(&self, tenant_id: TenantId, input: CreateRoleInput) -> AppResult<Role> {
        let taken = self
            .state
            .lock()
            .await
            .roles
            .values()
            .any(|role| role.tenant_id() == tenant_id && role.name() == input.name.trim());
        if taken {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                input.name
            )));
        }

        Ok(self.seed_role(tenant_id, &input.name, &input.grants).await)
    }

    async fn save_role_grants(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grants: &[Grant],
    ) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        let role = state
            .roles
            .get_mut(&(tenant_id, role_id.to_owned()))
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;
        *role = role.with_grants(grants.to_vec());
        Ok(role.clone())
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
        let mut state = self.state.lock().await;
        if state
            .assignments
            .iter()
            .any(|((tenant, _), assigned)| *tenant == tenant_id && assigned == role_id)
        {
            return Err(AppError::Conflict(format!("role '{role_id}' is in use")));
        }
        state
            .roles
            .remove(&(tenant_id, role_id.to_owned()))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))
    }

    async fn assign_role(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &str,
    ) -> AppResult<()> {
        self.state
            .lock()
            .await
            .assignments
            .insert((tenant_id, subject.to_owned()), role_id.to_owned());
        Ok(())
    }

    async fn unassign_role(&self, tenant_id: TenantId, subject: &str) -> AppResult<()> {
        self.state
            .lock()
            .await
            .assignments
            .remove(&(tenant_id, subject.to_owned()))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("subject '{subject}' has no role")))
    }

    async fn list_subjects_for_role(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> AppResult<Vec<String>> {
        if self.subject_listing_fails.load(Ordering::SeqCst) {
            return Err(AppError::Internal("subject listing unavailable".to_owned()));
        }

        let state = self.state.lock().await;
        let mut subjects: Vec<String> = state
            .assignments
            .iter()
            .filter(|((tenant, _), assigned)| *tenant == tenant_id && assigned.as_str() == role_id)
            .map(|((_, subject), _)| subject.clone())
            .collect();
        subjects.sort();
        Ok(subjects)
    }

    async fn list_role_assignments(&self, tenant_id: TenantId) -> AppResult<Vec<RoleAssignment>> {
        let state = self.state.lock().await;
        let mut assignments: Vec<RoleAssignment> = state
            .assignments
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .filter_map(|((_, subject), role_id)| {
                state
                    .roles
                    .get(&(tenant_id, role_id.clone()))
                    .map(|role| RoleAssignment {
                        subject: subject.clone(),
                        role_id: role_id.clone(),
                        role_name: role.name().to_owned(),
                    })
            })
            .collect();
        assignments.sort_by(|left, right| left.subject.cmp(&right.subject));
        Ok(assignments)
    }
}

pub(crate) fn grant(module: &str, action: &str, scope: &str) -> Grant {
    Grant::parse(module, action, scope).unwrap_or_else(|error| panic!("invalid grant: {error}"))
}

pub(crate) fn ability_stack(
    backend: Arc<FakeRoleBackend>,
    fetch_timeout: Duration,
) -> (PermissionStore, AbilityCache, AbilityService) {
    let store = PermissionStore::new(backend, fetch_timeout);
    let cache = AbilityCache::new(store.clone());
    let service = AbilityService::new(cache.clone());
    (store, cache, service)
}
