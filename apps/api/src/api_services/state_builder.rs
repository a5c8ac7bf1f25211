use std::sync::Arc;
use std::time::Duration;

use permisos_application::{
    AbilityCache, AbilityService, AuditRepository, PermissionSource, PermissionStore,
    RoleAdminRepository, RoleAdminService,
};
use permisos_core::AppError;
use permisos_infrastructure::{
    InMemoryAuditRepository, InMemoryRoleRepository, PostgresAuditRepository,
    PostgresRoleRepository, PostgrestPermissionSource,
};
use sqlx::PgPool;

use crate::api_config::{ApiConfig, PermissionBackendConfig};
use crate::state::AppState;

use super::bootstrap::ensure_bootstrap_admin;
use super::database::connect_and_migrate;

/// Ports wired for one permission backend.
pub(crate) struct BackendPorts {
    pub permission_source: Arc<dyn PermissionSource>,
    pub role_repository: Arc<dyn RoleAdminRepository>,
    pub audit_repository: Arc<dyn AuditRepository>,
    pub postgres_pool: Option<PgPool>,
}

pub async fn build_app_state(config: &ApiConfig) -> Result<AppState, AppError> {
    let ports = match &config.backend {
        PermissionBackendConfig::Postgres { database_url } => {
            let pool = connect_and_migrate(database_url).await?;
            let repository = Arc::new(PostgresRoleRepository::new(pool.clone()));
            BackendPorts {
                permission_source: repository.clone(),
                role_repository: repository,
                audit_repository: Arc::new(PostgresAuditRepository::new(pool.clone())),
                postgres_pool: Some(pool),
            }
        }
        PermissionBackendConfig::Postgrest {
            database_url,
            postgrest,
        } => {
            let pool = connect_and_migrate(database_url).await?;
            BackendPorts {
                permission_source: Arc::new(PostgrestPermissionSource::new(postgrest.clone())?),
                role_repository: Arc::new(PostgresRoleRepository::new(pool.clone())),
                audit_repository: Arc::new(PostgresAuditRepository::new(pool.clone())),
                postgres_pool: Some(pool),
            }
        }
        PermissionBackendConfig::Memory => {
            let repository = Arc::new(InMemoryRoleRepository::new());
            BackendPorts {
                permission_source: repository.clone(),
                role_repository: repository,
                audit_repository: Arc::new(InMemoryAuditRepository::new()),
                postgres_pool: None,
            }
        }
    };

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(ports.role_repository.as_ref(), admin).await?;
    }

    Ok(assemble_state(
        ports,
        config.fetch_timeout,
        config.gateway_shared_secret.clone(),
        config.backend.name(),
    ))
}

pub(crate) fn assemble_state(
    ports: BackendPorts,
    fetch_timeout: Duration,
    gateway_shared_secret: String,
    backend_name: &'static str,
) -> AppState {
    let store = PermissionStore::new(ports.permission_source, fetch_timeout);
    let ability_service = AbilityService::new(AbilityCache::new(store));
    let role_admin_service = RoleAdminService::new(
        ability_service.clone(),
        ports.role_repository,
        ports.audit_repository,
    );

    AppState {
        ability_service,
        role_admin_service,
        gateway_shared_secret,
        backend_name,
        postgres_pool: ports.postgres_pool,
    }
}
