use permisos_application::{AbilityService, RoleAdminService};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ability_service: AbilityService,
    pub role_admin_service: RoleAdminService,
    pub gateway_shared_secret: String,
    pub backend_name: &'static str,
    pub postgres_pool: Option<PgPool>,
}
