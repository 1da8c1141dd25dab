use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Page Router
///
/// The protected pages. The edge guard has already redirected anonymous callers and resolved the
/// session; the handlers add the role lookup through the `GateState` extractor.
pub fn page_routes() -> Router<AppState> {
    Router::new()
        // GET /dashboard?tab=users|roles
        .route("/dashboard", get(handlers::dashboard))
        // GET /profile
        .route("/profile", get(handlers::profile))
}

/// Authenticated Router Module
///
/// The publisher API. Open to any signed-in user regardless of role; wrapped in
/// `auth::require_session` in `create_router`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/taxonomy
        // Category and tag vocabulary for the publisher form.
        .route("/api/taxonomy", get(handlers::get_taxonomy))
        // GET /api/publishers?search=&category=&status=&date_from=&date_to=&page=&per_page=
        // POST /api/publishers
        .route(
            "/api/publishers",
            get(handlers::list_publishers).post(handlers::create_publisher),
        )
        // GET /api/publishers/categories
        // Categories in use, for the list filter. Static segments win over `{id}`.
        .route(
            "/api/publishers/categories",
            get(handlers::publisher_categories),
        )
        // POST /api/publishers/logo
        // Presigned logo upload. The file bytes never pass through this service.
        .route("/api/publishers/logo", post(handlers::upload_logo))
        // GET/PUT/DELETE /api/publishers/{id}
        .route(
            "/api/publishers/{id}",
            get(handlers::get_publisher)
                .put(handlers::update_publisher)
                .delete(handlers::delete_publisher),
        )
}
