use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// User and role management, nested under `/api`. Every handler checks its own capability
/// (`can_manage_users` or `can_manage_roles`) and answers 403 without it; holding one says
/// nothing about the other.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Users (can_manage_users) ---
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        // --- Roles (can_manage_roles) ---
        // The listing carries a per-role user count. The reserved role is refused by the store
        // on update and delete.
        .route(
            "/roles",
            get(handlers::list_roles).post(handlers::create_role),
        )
        .route(
            "/roles/{id}",
            put(handlers::update_role).delete(handlers::delete_role),
        )
}
