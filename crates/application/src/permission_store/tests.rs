use std::sync::Arc;
use std::time::Duration;

use permisos_core::{AppError, TenantId, UserIdentity};

use super::PermissionStore;
use crate::test_support::{FakeRoleBackend, grant};
use crate::{RawGrant, RoleRecord};

#[tokio::test]
async fn load_returns_role_with_parsed_grants() {
    let tenant_id = TenantId::new();
    let identity = UserIdentity::new("dra-lopez", tenant_id);
    let backend = Arc::new(FakeRoleBackend::default());
    let role = backend
        .seed_role(tenant_id, "Medico", &[grant("episodios", "ver", "tenant")])
        .await;
    backend.seed_assignment(&identity, role.role_id()).await;
    let store = PermissionStore::new(backend, Duration::from_secs(1));

    let loaded = store.load(&identity).await;
    assert!(loaded.is_ok());
    assert_eq!(loaded.ok().as_ref(), Some(&role));
    assert_eq!(store.cached_role(&identity).await, Some(role));
}

#[tokio::test]
async fn load_without_role_fails_not_found_and_clears_state() {
    let tenant_id = TenantId::new();
    let identity = UserIdentity::new("dra-lopez", tenant_id);
    let backend = Arc::new(FakeRoleBackend::default());
    let role = backend.seed_role(tenant_id, "Medico", &[]).await;
    backend.seed_assignment(&identity, role.role_id()).await;
    let store = PermissionStore::new(backend.clone(), Duration::from_secs(1));
    assert!(store.load(&identity).await.is_ok());

    let other = UserIdentity::new("sin-rol", tenant_id);
    let result = store.load(&other).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(store.cached_role(&other).await.is_none());
    assert!(store.cached_role(&identity).await.is_some());
}

#[tokio::test]
async fn load_surfaces_transport_failure() {
    let identity = UserIdentity::new("dra-lopez", TenantId::new());
    let backend = Arc::new(FakeRoleBackend::default());
    backend.set_unreachable(true);
    let store = PermissionStore::new(backend, Duration::from_secs(1));

    let result = store.load(&identity).await;
    assert!(matches!(result, Err(AppError::Transport(_))));
}

#[tokio::test]
async fn load_times_out_as_transport_failure() {
    let identity = UserIdentity::new("dra-lopez", TenantId::new());
    let backend = Arc::new(FakeRoleBackend::default());
    backend.set_fetch_delay(Duration::from_millis(200));
    let store = PermissionStore::new(backend, Duration::from_millis(20));

    let result = store.load(&identity).await;
    assert!(matches!(result, Err(AppError::Transport(_))));
}

#[tokio::test]
async fn load_rejects_malformed_grants() {
    let tenant_id = TenantId::new();
    let identity = UserIdentity::new("dra-lopez", tenant_id);
    let backend = Arc::new(FakeRoleBackend::default());
    backend
        .override_raw(
            &identity,
            RoleRecord {
                role_id: "role-x".to_owned(),
                name: "Medico".to_owned(),
                tenant_id,
                grants: vec![RawGrant::new("episodios", "ver", "planet-wide")],
            },
        )
        .await;
    let store = PermissionStore::new(backend, Duration::from_secs(1));

    let result = store.load(&identity).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(store.cached_role(&identity).await.is_none());
}

#[tokio::test]
async fn load_rejects_role_from_foreign_tenant() {
    let identity = UserIdentity::new("dra-lopez", TenantId::new());
    let backend = Arc::new(FakeRoleBackend::default());
    backend
        .override_raw(
            &identity,
            RoleRecord {
                role_id: "role-x".to_owned(),
                name: "Medico".to_owned(),
                tenant_id: TenantId::new(),
                grants: Vec::new(),
            },
        )
        .await;
    let store = PermissionStore::new(backend, Duration::from_secs(1));

    assert!(matches!(
        store.load(&identity).await,
        Err(AppError::Validation(_))
    ));
}
