use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod repository;
pub mod session;
pub mod storage;
pub mod taxonomy;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use identity::{IdentityState, MockIdentityProvider, SupabaseAuthClient};
pub use repository::{MockRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json` and browsable under
/// `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login_page, handlers::register_page, handlers::login, handlers::register,
        handlers::logout, handlers::request_otp, handlers::verify_otp, handlers::reset_password,
        handlers::dashboard, handlers::profile,
        handlers::list_users, handlers::get_user, handlers::create_user, handlers::update_user,
        handlers::delete_user,
        handlers::list_roles, handlers::create_role, handlers::update_role, handlers::delete_role,
        handlers::list_publishers, handlers::get_publisher, handlers::create_publisher,
        handlers::update_publisher, handlers::delete_publisher, handlers::publisher_categories,
        handlers::get_taxonomy, handlers::upload_logo,
    ),
    components(
        schemas(
            models::User, models::Role, models::Permissions, models::Publisher,
            models::PublisherStatus, models::UserRequest, models::RoleRequest,
            models::PublisherRequest, models::UpdatePublisherRequest, models::CredentialsRequest,
            models::EmailRequest, models::VerifyOtpRequest, models::LogoUploadRequest,
            models::PublisherPage, models::RoleSummary, models::Principal, models::AuthResponse,
            models::MessageResponse, models::LogoUploadResponse, models::ProfileView,
            models::EntryPage, models::TabView, models::DashboardView,
            gate::Capabilities, gate::Tab, taxonomy::CategoryOption, taxonomy::Taxonomy,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "publisher-console", description = "Publisher Console API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of the console's services. Every client is injected here at
/// startup and handed to the guard, the gate and the handlers through `FromRef`; nothing
/// reaches for a global.
#[derive(Clone)]
pub struct AppState {
    /// Data store: users, roles and publishers.
    pub repo: RepositoryState,
    /// Object storage for publisher logos.
    pub storage: StorageState,
    /// Identity provider: sessions and the sign-in/sign-up flows.
    pub identity: IdentityState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route group, the session layers and the observability stack.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Entry pages and auth actions.
        .merge(public::public_routes())
        // Protected pages: the edge guard below handles anonymous callers with a redirect.
        .merge(authenticated::page_routes())
        // Publisher API: any signed-in caller.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_session,
            )),
        )
        // User and role management. Capabilities are checked inside each handler.
        .nest(
            "/api",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_session,
            )),
        )
        // 3. Edge Access Guard: runs before every route, decides on protected and entry paths,
        // and writes renewed session cookies back on the way out.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::edge_guard,
        ))
        // Apply the Unified State to all routes.
        .with_state(state);

    // 4. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span with method, path and the `x-request-id` value, so every log
/// line of one request can be correlated. The query string is left out: it can carry emails
/// typed into the publisher search.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        path = %request.uri().path(),
        req_id = %request_id,
    )
}
