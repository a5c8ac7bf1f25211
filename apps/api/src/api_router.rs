use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use permisos_core::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

use cors::build_cors_layer;

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(build_protected_routes(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(frontend_url)?)
        .with_state(app_state))
}

fn build_protected_routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/abilities/me",
            get(handlers::abilities::my_ability_handler)
                .delete(handlers::abilities::evict_ability_handler),
        )
        .route(
            "/api/abilities/can",
            get(handlers::abilities::can_handler),
        )
        .route(
            "/api/abilities/refresh",
            post(handlers::abilities::refresh_ability_handler),
        )
        .route(
            "/api/roles",
            get(handlers::roles::list_roles_handler).post(handlers::roles::create_role_handler),
        )
        .route(
            "/api/roles/assignments",
            get(handlers::roles::list_role_assignments_handler)
                .post(handlers::roles::assign_role_handler)
                .delete(handlers::roles::unassign_role_handler),
        )
        .route(
            "/api/roles/{role_id}",
            delete(handlers::roles::delete_role_handler),
        )
        .route(
            "/api/roles/{role_id}/grants",
            put(handlers::roles::replace_grants_handler)
                .post(handlers::roles::add_grant_handler)
                .delete(handlers::roles::remove_grant_handler),
        )
        .route_layer(from_fn_with_state(
            app_state,
            middleware::require_gateway_identity,
        ))
}
