use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::IdentityState;
use crate::models::{Permissions, Principal, Role, User};
use crate::repository::RepositoryState;
use crate::session::{Session, SessionTokens};

/// Capabilities
///
/// The two feature switches the console derives from a role. Each feature area checks its own
/// flag; holding one says nothing about the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Capabilities {
    pub can_manage_users: bool,
    pub can_manage_roles: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn allows(&self, tab: Tab) -> bool {
        match tab {
            Tab::Users => self.can_manage_users,
            Tab::Roles => self.can_manage_roles,
        }
    }

    /// Tabs this caller may open, in display order.
    pub fn permitted_tabs(&self) -> Vec<Tab> {
        Tab::ALL
            .into_iter()
            .filter(|tab| self.allows(*tab))
            .collect()
    }
}

impl From<&Permissions> for Capabilities {
    fn from(permissions: &Permissions) -> Self {
        Self {
            can_manage_users: permissions.user_management,
            can_manage_roles: permissions.role_management,
        }
    }
}

/// Tab
///
/// The management areas of the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Tab {
    #[default]
    Users,
    Roles,
}

impl Tab {
    pub const ALL: [Tab; 2] = [Tab::Users, Tab::Roles];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabAccess {
    Granted(Tab),
    /// The caller lacks the capability for `requested`. `fallback` is the first tab they may
    /// use instead, if any.
    Denied { requested: Tab, fallback: Option<Tab> },
}

/// GateState
///
/// Where the authorization of one request stands. Starts as `Resolving` and settles on one of
/// the other three; it is rebuilt from scratch on every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum GateState {
    #[default]
    Resolving,
    Unauthenticated,
    /// Signed in, but without a role that grants anything: no role, a dangling role name, a
    /// missing user record, or a failed lookup.
    AuthenticatedUnknownRole { principal: Principal },
    Authorized {
        principal: Principal,
        role: Role,
        capabilities: Capabilities,
    },
}

impl GateState {
    /// Zero for every state but `Authorized`.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            GateState::Authorized { capabilities, .. } => *capabilities,
            _ => Capabilities::none(),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            GateState::AuthenticatedUnknownRole { principal }
            | GateState::Authorized { principal, .. } => Some(principal),
            _ => None,
        }
    }

    pub fn tab_access(&self, tab: Tab) -> TabAccess {
        let capabilities = self.capabilities();
        if capabilities.allows(tab) {
            TabAccess::Granted(tab)
        } else {
            TabAccess::Denied {
                requested: tab,
                fallback: capabilities.permitted_tabs().into_iter().next(),
            }
        }
    }
}

/// AuthorizationGate
///
/// Turns session material into a `GateState`: session, then user record and role list, then
/// capabilities. Every failure along the way lands on the most restrictive state reachable.
#[derive(Clone)]
pub struct AuthorizationGate {
    identity: IdentityState,
    repo: RepositoryState,
}

impl AuthorizationGate {
    pub fn new(identity: IdentityState, repo: RepositoryState) -> Self {
        Self { identity, repo }
    }

    pub async fn resolve(&self, tokens: &SessionTokens) -> GateState {
        if tokens.is_empty() {
            return GateState::Unauthenticated;
        }

        let session = match self.identity.get_session(tokens).await {
            Ok(Some(session)) => session,
            Ok(None) => return GateState::Unauthenticated,
            Err(e) => {
                tracing::warn!("session lookup failed during authorization: {}", e);
                return GateState::Unauthenticated;
            }
        };

        self.resolve_subject(session.user_id, &session.email).await
    }

    /// resolve_subject
    ///
    /// Resolves the permissions of an already authenticated subject. The user record and the
    /// role list are fetched concurrently and both must settle before anything is decided.
    pub async fn resolve_subject(&self, user_id: Uuid, email: &str) -> GateState {
        let (user, roles) = tokio::join!(self.repo.get_user(user_id), self.repo.list_roles());
        authorize(user_id, email, user, roles)
    }
}

/// authorize
///
/// The pure part of the gate: given the outcome of both lookups, pick the state.
pub fn authorize(
    user_id: Uuid,
    session_email: &str,
    user: Result<Option<User>, StoreError>,
    roles: Result<Vec<Role>, StoreError>,
) -> GateState {
    let user = match user {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(%user_id, "user lookup failed, granting nothing: {}", e);
            None
        }
    };

    let principal = Principal {
        id: user_id,
        email: user
            .as_ref()
            .map(|user| user.email.clone())
            .unwrap_or_else(|| session_email.to_string()),
        role: user.as_ref().and_then(|user| user.role.clone()),
    };

    let Some(role_name) = principal.role.clone() else {
        return GateState::AuthenticatedUnknownRole { principal };
    };

    let roles = match roles {
        Ok(roles) => roles,
        Err(e) => {
            tracing::warn!(%user_id, "role lookup failed, granting nothing: {}", e);
            return GateState::AuthenticatedUnknownRole { principal };
        }
    };

    match roles.into_iter().find(|role| role.name == role_name) {
        Some(role) => {
            let capabilities = Capabilities::from(&role.permissions);
            GateState::Authorized {
                principal,
                role,
                capabilities,
            }
        }
        None => {
            tracing::debug!(%user_id, role = %role_name, "dangling role reference");
            GateState::AuthenticatedUnknownRole { principal }
        }
    }
}

/// GateState Extractor
///
/// Runs the gate for the current request. Never rejects: anonymous callers simply get
/// `Unauthenticated`, and the handler decides what that means for its page.
///
/// Behind the edge guard the session is already resolved and sits in the request extensions;
/// only the user record and role list are fetched then.
impl<S> FromRequestParts<S> for GateState
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = AuthorizationGate::new(
            IdentityState::from_ref(state),
            RepositoryState::from_ref(state),
        );
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(gate.resolve_subject(session.user_id, &session.email).await);
        }
        let tokens = SessionTokens::from_headers(&parts.headers);
        Ok(gate.resolve(&tokens).await)
    }
}
