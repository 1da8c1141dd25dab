use crate::{
    AppState,
    auth::AuthUser,
    error::{ConsoleError, StoreError, conflict_message},
    gate::{GateState, Tab, TabAccess},
    models::{
        AuthResponse, CredentialsRequest, DashboardView, EmailRequest, EntryPage,
        LogoUploadRequest, LogoUploadResponse, MessageResponse, ProfileView, Publisher,
        PublisherFilter, PublisherPage, PublisherRequest, Role, RoleRequest, RoleSummary,
        TabView, UpdatePublisherRequest, User, UserRequest, VerifyOtpRequest,
    },
    session::{Session, SessionTokens, clear_session_cookies, write_session_cookies},
    storage::logo_key,
    taxonomy::{self, CategoryOption, MAX_TAGS, Taxonomy},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use uuid::Uuid;

// --- Query Structs ---

/// DashboardQuery
///
/// Query parameters of GET /dashboard. Without `tab` the users tab is requested.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct DashboardQuery {
    #[param(value_type = Option<String>, example = "roles")]
    pub tab: Option<Tab>,
}

// --- Helpers ---

/// Trims a required text field and rejects it when empty.
fn required(value: &str, field: &str) -> Result<String, ConsoleError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConsoleError::BadRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn check_tags(tags: &[String]) -> Result<(), ConsoleError> {
    if tags.len() > MAX_TAGS {
        return Err(ConsoleError::BadRequest(format!(
            "A publisher can have at most {} tags",
            MAX_TAGS
        )));
    }
    Ok(())
}

/// Rejects an email already held by a user other than `owner`.
async fn ensure_email_free(
    state: &AppState,
    email: &str,
    owner: Option<Uuid>,
) -> Result<(), ConsoleError> {
    match state.repo.get_user_by_email(email).await? {
        Some(user) if Some(user.id) != owner => Err(StoreError::Conflict(
            conflict_message(Some("users_email_key")).to_string(),
        )
        .into()),
        _ => Ok(()),
    }
}

/// Builds the response of a successful sign-in and attaches the session cookies.
fn signed_in(state: &AppState, session: &Session, status: StatusCode) -> Response {
    let body = AuthResponse {
        user_id: session.user_id,
        email: session.email.clone(),
        signed_in: true,
        redirect_to: state.config.access_rules.landing.clone(),
    };
    let mut response = (status, Json(body)).into_response();
    write_session_cookies(
        response.headers_mut(),
        session,
        state.config.secure_cookies(),
    );
    response
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

// --- Entry Pages & Authentication ---

/// login_page
///
/// [Entry Route] The sign-in page. Signed-in callers never get here: the edge guard sends them
/// to the dashboard first.
#[utoipa::path(
    get,
    path = "/login",
    responses((status = 200, description = "Sign-in page", body = EntryPage))
)]
pub async fn login_page() -> Json<EntryPage> {
    Json(EntryPage {
        page: "login".to_string(),
        otp_sign_in: true,
    })
}

/// register_page
#[utoipa::path(
    get,
    path = "/register",
    responses((status = 200, description = "Registration page", body = EntryPage))
)]
pub async fn register_page() -> Json<EntryPage> {
    Json(EntryPage {
        page: "register".to_string(),
        otp_sign_in: false,
    })
}

/// login
///
/// [Public Route] Password sign-in. Sets the session cookies on success.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 502, description = "Identity provider unavailable")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, ConsoleError> {
    let email = required(&payload.email, "Email")?;
    if payload.password.is_empty() {
        return Err(ConsoleError::BadRequest("Password is required".to_string()));
    }

    let session = state
        .identity
        .sign_in_with_password(&email, &payload.password)
        .await
        .map_err(ConsoleError::SignIn)?;

    tracing::info!(user_id = %session.user_id, "password sign-in");
    Ok(signed_in(&state, &session, StatusCode::OK))
}

/// register
///
/// [Public Route] Creates the account at the identity provider, then mirrors it into the
/// `users` table with the configured sign-up role (none by default).
///
/// *Note*: a failed mirror insert is logged, not returned. The account exists either way, and a
/// user without a record resolves to zero permissions.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Rejected by the identity provider")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, ConsoleError> {
    let email = required(&payload.email, "Email")?;
    if payload.password.is_empty() {
        return Err(ConsoleError::BadRequest("Password is required".to_string()));
    }

    let outcome = state.identity.sign_up(&email, &payload.password).await?;

    let record = UserRequest {
        email: outcome.email.clone(),
        role: state.config.signup_role.clone(),
    };
    if let Err(e) = state.repo.create_user(outcome.user_id, record).await {
        tracing::error!(user_id = %outcome.user_id, "could not create user record: {}", e);
    }

    match outcome.session {
        Some(session) => Ok(signed_in(&state, &session, StatusCode::CREATED)),
        None => Ok((
            StatusCode::CREATED,
            Json(AuthResponse {
                user_id: outcome.user_id,
                email: outcome.email,
                signed_in: false,
                redirect_to: state.config.access_rules.sign_in.clone(),
            }),
        )
            .into_response()),
    }
}

/// logout
///
/// [Public Route] Invalidates the session at the provider and clears the cookies. The cookies
/// are cleared even when the provider call fails.
///
/// The session is resolved first: an expired access token is renewed so that the revocation
/// also reaches the refresh token.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Signed out", body = MessageResponse))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let tokens = SessionTokens::from_headers(&headers);
    let access_token = match state.identity.get_session(&tokens).await {
        Ok(Some(session)) => Some(session.access_token),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("session lookup failed during sign-out: {}", e);
            tokens.access_token.clone()
        }
    };

    if let Some(access_token) = access_token {
        if let Err(e) = state.identity.sign_out(&access_token).await {
            tracing::warn!("provider sign-out failed: {}", e);
        }
    }

    let mut response = message("Signed out").into_response();
    clear_session_cookies(response.headers_mut(), state.config.secure_cookies());
    response
}

/// request_otp
///
/// [Public Route] Emails a one-time sign-in code. Only existing accounts can sign in this way.
#[utoipa::path(
    post,
    path = "/auth/otp",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Rejected by the identity provider")
    )
)]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ConsoleError> {
    let email = required(&payload.email, "Email")?;
    state.identity.sign_in_with_otp(&email).await?;
    Ok(message("Check your email for the sign-in code"))
}

/// verify_otp
#[utoipa::path(
    post,
    path = "/auth/otp/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid or expired code")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Response, ConsoleError> {
    let email = required(&payload.email, "Email")?;
    let token = required(&payload.token, "Code")?;

    let session = state
        .identity
        .verify_otp(&email, &token)
        .await
        .map_err(ConsoleError::SignIn)?;

    tracing::info!(user_id = %session.user_id, "one-time code sign-in");
    Ok(signed_in(&state, &session, StatusCode::OK))
}

/// reset_password
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    request_body = EmailRequest,
    responses((status = 200, description = "Reset email sent", body = MessageResponse))
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ConsoleError> {
    let email = required(&payload.email, "Email")?;
    state.identity.reset_password_for_email(&email).await?;
    Ok(message("Check your email for the password reset link"))
}

// --- Protected Pages ---

/// dashboard
///
/// [Protected Route] The management console. Returns the caller's capabilities and the content
/// of the requested tab, or an access-denied view naming the tab they may use instead.
#[utoipa::path(
    get,
    path = "/dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Dashboard", body = DashboardView),
        (status = 307, description = "Not signed in")
    )
)]
pub async fn dashboard(
    gate: GateState,
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, ConsoleError> {
    let Some(principal) = gate.principal().cloned() else {
        return Ok(Redirect::temporary(&state.config.access_rules.sign_in).into_response());
    };

    let tab = match gate.tab_access(query.tab.unwrap_or_default()) {
        TabAccess::Granted(Tab::Users) => TabView::Users {
            users: state.repo.list_users().await?,
        },
        TabAccess::Granted(Tab::Roles) => {
            let (roles, users) =
                tokio::try_join!(state.repo.list_roles(), state.repo.list_users())?;
            TabView::Roles {
                roles: RoleSummary::summarize(roles, &users),
            }
        }
        TabAccess::Denied {
            requested,
            fallback,
        } => TabView::AccessDenied {
            requested,
            fallback,
        },
    };

    Ok(Json(DashboardView {
        principal,
        capabilities: gate.capabilities(),
        tab,
    })
    .into_response())
}

/// profile
///
/// [Protected Route] The caller's own profile. Without a user record, the session identity is
/// shown instead.
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Profile", body = ProfileView),
        (status = 307, description = "Not signed in")
    )
)]
pub async fn profile(
    gate: GateState,
    State(state): State<AppState>,
) -> Result<Response, ConsoleError> {
    let Some(principal) = gate.principal().cloned() else {
        return Ok(Redirect::temporary(&state.config.access_rules.sign_in).into_response());
    };

    let view = match state.repo.get_user(principal.id).await? {
        Some(user) => ProfileView {
            id: user.id,
            email: user.email,
            role: user.role,
            created_at: Some(user.created_at),
        },
        None => ProfileView {
            id: principal.id,
            email: principal.email,
            role: None,
            created_at: None,
        },
    };
    Ok(Json(view).into_response())
}

// --- User Management (requires can_manage_users) ---

/// list_users
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users, newest first", body = [User]),
        (status = 403, description = "Missing user management permission")
    )
)]
pub async fn list_users(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, ConsoleError> {
    auth.require_user_management()?;
    Ok(Json(state.repo.list_users().await?))
}

/// get_user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ConsoleError> {
    auth.require_user_management()?;
    let user = state.repo.get_user(id).await?.ok_or(StoreError::NotFound)?;
    Ok(Json(user))
}

/// create_user
///
/// [Console Route] Adds a user record. `role`, when given, must name an existing role.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = UserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 409, description = "Email already in use"),
        (status = 422, description = "Unknown role")
    )
)]
pub async fn create_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<UserRequest>,
) -> Result<(StatusCode, Json<User>), ConsoleError> {
    auth.require_user_management()?;
    payload.email = required(&payload.email, "Email")?;
    ensure_email_free(&state, &payload.email, None).await?;

    let user = state.repo.create_user(Uuid::new_v4(), payload).await?;
    tracing::info!(actor = %auth.id(), user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_user
///
/// [Console Route] Replaces a user's email and role assignment.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Email already in use"),
        (status = 422, description = "Unknown role")
    )
)]
pub async fn update_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UserRequest>,
) -> Result<Json<User>, ConsoleError> {
    auth.require_user_management()?;
    payload.email = required(&payload.email, "Email")?;
    ensure_email_free(&state, &payload.email, Some(id)).await?;

    let user = state.repo.update_user(id, payload).await?;
    tracing::info!(actor = %auth.id(), user_id = %user.id, role = ?user.role, "user updated");
    Ok(Json(user))
}

/// delete_user
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ConsoleError> {
    auth.require_user_management()?;
    state.repo.delete_user(id).await?;
    tracing::info!(actor = %auth.id(), user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Role Management (requires can_manage_roles) ---

/// list_roles
///
/// [Console Route] All roles by name, each with the number of users assigned to it.
#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "Roles", body = [RoleSummary]),
        (status = 403, description = "Missing role management permission")
    )
)]
pub async fn list_roles(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleSummary>>, ConsoleError> {
    auth.require_role_management()?;
    let (roles, users) = tokio::try_join!(state.repo.list_roles(), state.repo.list_users())?;
    Ok(Json(RoleSummary::summarize(roles, &users)))
}

/// create_role
#[utoipa::path(
    post,
    path = "/api/roles",
    request_body = RoleRequest,
    responses(
        (status = 201, description = "Created", body = Role),
        (status = 409, description = "Name taken or reserved")
    )
)]
pub async fn create_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<RoleRequest>,
) -> Result<(StatusCode, Json<Role>), ConsoleError> {
    auth.require_role_management()?;
    payload.name = required(&payload.name, "Role name")?;

    let role = state.repo.create_role(payload).await?;
    tracing::info!(actor = %auth.id(), role = %role.name, "role created");
    Ok((StatusCode::CREATED, Json(role)))
}

/// update_role
///
/// [Console Route] Replaces a role. A rename carries the role's users along. The reserved role
/// is refused by the store.
#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Updated", body = Role),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Reserved role or name taken")
    )
)]
pub async fn update_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<RoleRequest>,
) -> Result<Json<Role>, ConsoleError> {
    auth.require_role_management()?;
    payload.name = required(&payload.name, "Role name")?;

    let role = state.repo.update_role(id, payload).await?;
    tracing::info!(actor = %auth.id(), role = %role.name, "role updated");
    Ok(Json(role))
}

/// delete_role
#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Reserved role")
    )
)]
pub async fn delete_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ConsoleError> {
    auth.require_role_management()?;
    state.repo.delete_role(id).await?;
    tracing::info!(actor = %auth.id(), role_id = %id, "role deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Publishers (any signed-in user) ---

/// list_publishers
///
/// [Console Route] Filtered, paginated publisher listing, newest first.
#[utoipa::path(
    get,
    path = "/api/publishers",
    params(PublisherFilter),
    responses((status = 200, description = "One page of publishers", body = PublisherPage))
)]
pub async fn list_publishers(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<PublisherFilter>,
) -> Result<Json<PublisherPage>, ConsoleError> {
    Ok(Json(state.repo.list_publishers(&filter).await?))
}

/// get_publisher
#[utoipa::path(
    get,
    path = "/api/publishers/{id}",
    params(("id" = Uuid, Path, description = "Publisher ID")),
    responses(
        (status = 200, description = "Publisher", body = Publisher),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_publisher(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Publisher>, ConsoleError> {
    let publisher = state
        .repo
        .get_publisher(id)
        .await?
        .ok_or(StoreError::NotFound)?;
    Ok(Json(publisher))
}

/// create_publisher
#[utoipa::path(
    post,
    path = "/api/publishers",
    request_body = PublisherRequest,
    responses(
        (status = 201, description = "Created", body = Publisher),
        (status = 400, description = "Missing name or too many tags")
    )
)]
pub async fn create_publisher(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<PublisherRequest>,
) -> Result<(StatusCode, Json<Publisher>), ConsoleError> {
    payload.name = required(&payload.name, "Publisher name")?;
    check_tags(&payload.tags)?;

    let publisher = state.repo.create_publisher(payload).await?;
    tracing::info!(actor = %auth.id(), publisher_id = %publisher.id, "publisher created");
    Ok((StatusCode::CREATED, Json(publisher)))
}

/// update_publisher
///
/// [Console Route] Partial update: only the fields present in the body are written.
#[utoipa::path(
    put,
    path = "/api/publishers/{id}",
    params(("id" = Uuid, Path, description = "Publisher ID")),
    request_body = UpdatePublisherRequest,
    responses(
        (status = 200, description = "Updated", body = Publisher),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_publisher(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdatePublisherRequest>,
) -> Result<Json<Publisher>, ConsoleError> {
    if let Some(name) = &payload.name {
        payload.name = Some(required(name, "Publisher name")?);
    }
    if let Some(tags) = &payload.tags {
        check_tags(tags)?;
    }

    let publisher = state.repo.update_publisher(id, payload).await?;
    tracing::info!(actor = %auth.id(), publisher_id = %publisher.id, "publisher updated");
    Ok(Json(publisher))
}

/// delete_publisher
#[utoipa::path(
    delete,
    path = "/api/publishers/{id}",
    params(("id" = Uuid, Path, description = "Publisher ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_publisher(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ConsoleError> {
    state.repo.delete_publisher(id).await?;
    tracing::info!(actor = %auth.id(), publisher_id = %id, "publisher deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// publisher_categories
///
/// [Console Route] Categories currently in use, for the list page filter.
#[utoipa::path(
    get,
    path = "/api/publishers/categories",
    responses((status = 200, description = "Categories in use", body = [CategoryOption]))
)]
pub async fn publisher_categories(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryOption>>, ConsoleError> {
    let categories = state
        .repo
        .publisher_categories()
        .await?
        .into_iter()
        .map(|slug| CategoryOption {
            label: taxonomy::category_label(&slug)
                .map(str::to_string)
                .unwrap_or_else(|| slug.clone()),
            value: slug,
        })
        .collect();
    Ok(Json(categories))
}

/// get_taxonomy
#[utoipa::path(
    get,
    path = "/api/taxonomy",
    responses((status = 200, description = "Category and tag vocabulary", body = Taxonomy))
)]
pub async fn get_taxonomy(_auth: AuthUser) -> Json<Taxonomy> {
    Json(taxonomy::taxonomy())
}

/// upload_logo
///
/// [Console Route] Prepares a logo upload. The client PUTs the file to `upload_url` (with the
/// same Content-Type) and then saves `public_url` as the publisher's `logo_url`.
#[utoipa::path(
    post,
    path = "/api/publishers/logo",
    request_body = LogoUploadRequest,
    responses(
        (status = 200, description = "Upload URL", body = LogoUploadResponse),
        (status = 500, description = "Storage unavailable")
    )
)]
pub async fn upload_logo(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<LogoUploadRequest>,
) -> Result<Json<LogoUploadResponse>, ConsoleError> {
    let file_type = required(&payload.file_type, "File type")?;
    if !file_type.starts_with("image/") {
        return Err(ConsoleError::BadRequest(
            "Logos must be image files".to_string(),
        ));
    }

    let key = logo_key(&payload.filename);
    let upload_url = state.storage.presign_upload(&key, &file_type).await?;

    Ok(Json(LogoUploadResponse {
        upload_url,
        public_url: state.storage.public_url(&key),
        resource_key: key,
    }))
}
