use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    AppState,
    config::{AppConfig, Env},
    error::ConsoleError,
    gate::{AuthorizationGate, Capabilities, GateState},
    guard::{resolve_session, write_back},
    identity::IdentityState,
    models::Principal,
    repository::RepositoryState,
    session::{SessionTokens, rewrite_request_cookies},
};

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated API request: who the caller is and what their
/// role lets them do. Handlers check `capabilities` themselves before touching users or roles.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub principal: Principal,
    pub capabilities: Capabilities,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.principal.id
    }

    pub fn require_user_management(&self) -> Result<(), ConsoleError> {
        if self.capabilities.can_manage_users {
            Ok(())
        } else {
            Err(ConsoleError::Forbidden(
                "Your role does not allow managing users".to_string(),
            ))
        }
    }

    pub fn require_role_management(&self) -> Result<(), ConsoleError> {
        if self.capabilities.can_manage_roles {
            Ok(())
        } else {
            Err(ConsoleError::Forbidden(
                "Your role does not allow managing roles".to_string(),
            ))
        }
    }
}

impl TryFrom<GateState> for AuthUser {
    type Error = ConsoleError;

    fn try_from(state: GateState) -> Result<Self, Self::Error> {
        let capabilities = state.capabilities();
        match state {
            GateState::Authorized { principal, .. }
            | GateState::AuthenticatedUnknownRole { principal } => Ok(AuthUser {
                principal,
                capabilities,
            }),
            GateState::Resolving | GateState::Unauthenticated => Err(ConsoleError::Unauthorized),
        }
    }
}

/// Local development bypass: a known user id in `x-user-id` stands in for a session.
/// Only honoured in `Env::Local` and only for ids that exist in the user table.
async fn local_bypass(
    config: &AppConfig,
    repo: &RepositoryState,
    gate: &AuthorizationGate,
    headers: &HeaderMap,
) -> Option<GateState> {
    if config.env != Env::Local {
        return None;
    }
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())?;

    match repo.get_user(user_id).await {
        Ok(Some(user)) => {
            tracing::debug!(%user_id, "x-user-id bypass");
            Some(gate.resolve_subject(user.id, &user.email).await)
        }
        _ => None,
    }
}

/// require_session
///
/// Middleware for the `/api` routes. Resolves the session exactly once, rejects anonymous
/// callers with 401 and leaves the resolved `AuthUser` in the request extensions for the
/// handler. Renewed tokens go downstream in the `Cookie` header and back to the browser as
/// `Set-Cookie`, the same as on guarded pages.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let gate = AuthorizationGate::new(state.identity.clone(), state.repo.clone());

    let bypass = local_bypass(&state.config, &state.repo, &gate, request.headers()).await;
    if let Some(bypass) = bypass {
        return match AuthUser::try_from(bypass) {
            Ok(user) => {
                request.extensions_mut().insert(user);
                next.run(request).await
            }
            Err(e) => e.into_response(),
        };
    }

    let tokens = SessionTokens::from_headers(request.headers());
    let (session, stale) = resolve_session(&state.identity, &tokens).await;
    let renewed = session
        .as_ref()
        .filter(|session| session.is_renewal_of(&tokens))
        .cloned();

    let mut response = match session {
        Some(session) => {
            let resolved = gate.resolve_subject(session.user_id, &session.email).await;
            match AuthUser::try_from(resolved) {
                Ok(user) => {
                    if let Some(renewed) = &renewed {
                        rewrite_request_cookies(request.headers_mut(), renewed);
                    }
                    request.extensions_mut().insert(user);
                    next.run(request).await
                }
                Err(e) => e.into_response(),
            }
        }
        None => ConsoleError::Unauthorized.into_response(),
    };

    write_back(&mut response, renewed.as_ref(), stale, state.config.secure_cookies());
    response
}

/// AuthUser Extractor Implementation
///
/// Behind `require_session` this only picks up the caller already resolved for the request.
/// Elsewhere it runs the gate itself and rejects anonymous callers with 401. A signed-in caller
/// without a usable role is still let through, with zero capabilities.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ConsoleError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let gate = AuthorizationGate::new(IdentityState::from_ref(state), repo.clone());

        if let Some(bypass) = local_bypass(&config, &repo, &gate, &parts.headers).await {
            return AuthUser::try_from(bypass);
        }

        let tokens = SessionTokens::from_headers(&parts.headers);
        AuthUser::try_from(gate.resolve(&tokens).await)
    }
}
