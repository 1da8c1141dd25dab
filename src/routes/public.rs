use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. `/login` and `/register` are entry pages: the edge
/// guard bounces callers who already have a session to the dashboard before these run.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // --- Entry Pages ---
        .route("/login", get(handlers::login_page))
        .route("/register", get(handlers::register_page))
        // --- Authentication Actions ---
        // Successful sign-ins set the session cookies; logout clears them.
        .route("/auth/login", post(handlers::login))
        .route("/auth/register", post(handlers::register))
        .route("/auth/logout", post(handlers::logout))
        // One-time code sign-in for existing accounts only.
        .route("/auth/otp", post(handlers::request_otp))
        .route("/auth/otp/verify", post(handlers::verify_otp))
        .route("/auth/password/reset", post(handlers::reset_password))
}
