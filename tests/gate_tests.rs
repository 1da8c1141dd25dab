use publisher_console::{
    MockIdentityProvider, MockRepository,
    error::StoreError,
    gate::{AuthorizationGate, Capabilities, GateState, Tab, TabAccess, authorize},
    identity::IdentityState,
    models::{Permissions, RoleRequest, User},
    repository::{Repository, RepositoryState, role},
    session::{Session, SessionTokens},
};
use std::sync::Arc;
use uuid::Uuid;

// --- Helpers ---

fn user(id: Uuid, role: Option<&str>) -> User {
    User {
        id,
        email: "someone@example.com".to_string(),
        role: role.map(str::to_string),
        ..User::default()
    }
}

/// A gate over a signed-in session and the given repository.
fn signed_in(repo: MockRepository) -> (AuthorizationGate, Session) {
    let session = MockIdentityProvider::issue(Uuid::new_v4(), "someone@example.com");
    let identity = Arc::new(MockIdentityProvider::new().with_session(&session)) as IdentityState;
    let gate = AuthorizationGate::new(identity, Arc::new(repo) as RepositoryState);
    (gate, session)
}

fn gate_for(repo_for: impl FnOnce(Uuid) -> MockRepository) -> (AuthorizationGate, SessionTokens) {
    let user_id = Uuid::new_v4();
    let session = MockIdentityProvider::issue(user_id, "someone@example.com");
    let identity = Arc::new(MockIdentityProvider::new().with_session(&session)) as IdentityState;
    let gate = AuthorizationGate::new(identity, Arc::new(repo_for(user_id)) as RepositoryState);
    (gate, SessionTokens::from(&session))
}

// --- State Machine ---

#[test]
fn test_initial_state_is_resolving_with_no_capabilities() {
    let state = GateState::default();
    assert_eq!(state, GateState::Resolving);
    assert_eq!(state.capabilities(), Capabilities::none());
    assert!(state.principal().is_none());
}

#[tokio::test]
async fn test_no_session_is_unauthenticated() {
    let (gate, _) = signed_in(MockRepository::new());

    let state = gate.resolve(&SessionTokens::default()).await;

    assert_eq!(state, GateState::Unauthenticated);
}

#[tokio::test]
async fn test_unknown_session_is_unauthenticated_without_data_fetches() {
    // Failing tables would only matter if the gate went past the session check.
    let (gate, _) = signed_in(MockRepository::new().failing_users().failing_roles());

    let state = gate
        .resolve(&SessionTokens {
            access_token: Some("forged".to_string()),
            refresh_token: None,
        })
        .await;

    assert_eq!(state, GateState::Unauthenticated);
}

#[tokio::test]
async fn test_provider_failure_is_unauthenticated() {
    let session = MockIdentityProvider::issue(Uuid::new_v4(), "a@example.com");
    let gate = AuthorizationGate::new(
        Arc::new(MockIdentityProvider::unavailable()) as IdentityState,
        Arc::new(MockRepository::new()) as RepositoryState,
    );

    let state = gate.resolve(&SessionTokens::from(&session)).await;

    assert_eq!(state, GateState::Unauthenticated);
}

#[tokio::test]
async fn test_editor_scenario_users_only() {
    let (gate, tokens) = gate_for(|id| {
        MockRepository::new()
            .with_roles(vec![role("editor", true, false)])
            .with_users(vec![user(id, Some("editor"))])
    });

    let state = gate.resolve(&tokens).await;

    assert!(matches!(state, GateState::Authorized { .. }));
    assert_eq!(
        state.capabilities(),
        Capabilities {
            can_manage_users: true,
            can_manage_roles: false,
        }
    );
    assert_eq!(state.tab_access(Tab::Users), TabAccess::Granted(Tab::Users));
    assert_eq!(
        state.tab_access(Tab::Roles),
        TabAccess::Denied {
            requested: Tab::Roles,
            fallback: Some(Tab::Users),
        }
    );
}

#[tokio::test]
async fn test_role_manager_without_user_management() {
    let (gate, tokens) = gate_for(|id| {
        MockRepository::new()
            .with_roles(vec![role("auditor", false, true)])
            .with_users(vec![user(id, Some("auditor"))])
    });

    let state = gate.resolve(&tokens).await;

    assert_eq!(
        state.tab_access(Tab::Users),
        TabAccess::Denied {
            requested: Tab::Users,
            fallback: Some(Tab::Roles),
        }
    );
    assert_eq!(state.tab_access(Tab::Roles), TabAccess::Granted(Tab::Roles));
}

#[tokio::test]
async fn test_null_role_has_no_capabilities() {
    let (gate, tokens) = gate_for(|id| {
        MockRepository::new()
            .with_roles(vec![role("editor", true, true)])
            .with_users(vec![user(id, None)])
    });

    let state = gate.resolve(&tokens).await;

    assert!(matches!(state, GateState::AuthenticatedUnknownRole { .. }));
    assert_eq!(state.capabilities(), Capabilities::none());
    assert_eq!(
        state.tab_access(Tab::Users),
        TabAccess::Denied {
            requested: Tab::Users,
            fallback: None,
        }
    );
}

#[tokio::test]
async fn test_dangling_role_has_no_capabilities() {
    let (gate, tokens) = gate_for(|id| {
        MockRepository::new()
            .with_roles(vec![role("editor", true, true)])
            .with_users(vec![user(id, Some("ghost"))])
    });

    let state = gate.resolve(&tokens).await;

    match &state {
        GateState::AuthenticatedUnknownRole { principal } => {
            assert_eq!(principal.role.as_deref(), Some("ghost"));
        }
        other => panic!("expected AuthenticatedUnknownRole, got {:?}", other),
    }
    assert_eq!(state.capabilities(), Capabilities::none());
}

#[tokio::test]
async fn test_empty_role_list_is_treated_as_dangling() {
    let (gate, tokens) =
        gate_for(|id| MockRepository::new().with_users(vec![user(id, Some("admin"))]));

    let state = gate.resolve(&tokens).await;

    assert!(matches!(state, GateState::AuthenticatedUnknownRole { .. }));
    assert_eq!(state.capabilities(), Capabilities::none());
}

#[tokio::test]
async fn test_missing_user_record_falls_back_to_session_identity() {
    let (gate, session) =
        signed_in(MockRepository::new().with_roles(vec![role("editor", true, true)]));

    let state = gate.resolve(&SessionTokens::from(&session)).await;

    let principal = state.principal().cloned().unwrap();
    assert_eq!(principal.id, session.user_id);
    assert_eq!(principal.email, session.email);
    assert_eq!(principal.role, None);
    assert_eq!(state.capabilities(), Capabilities::none());
}

#[tokio::test]
async fn test_role_lookup_failure_grants_nothing() {
    let (gate, tokens) = gate_for(|id| {
        MockRepository::new()
            .with_roles(vec![role("editor", true, true)])
            .with_users(vec![user(id, Some("editor"))])
            .failing_roles()
    });

    let state = gate.resolve(&tokens).await;

    assert!(matches!(state, GateState::AuthenticatedUnknownRole { .. }));
    assert_eq!(state.capabilities(), Capabilities::none());
}

#[tokio::test]
async fn test_user_lookup_failure_grants_nothing() {
    let (gate, tokens) = gate_for(|id| {
        MockRepository::new()
            .with_roles(vec![role("editor", true, true)])
            .with_users(vec![user(id, Some("editor"))])
            .failing_users()
    });

    let state = gate.resolve(&tokens).await;

    assert!(matches!(state, GateState::AuthenticatedUnknownRole { .. }));
    assert_eq!(state.capabilities(), Capabilities::none());
}

#[tokio::test]
async fn test_role_change_takes_effect_on_next_resolution() {
    let user_id = Uuid::new_v4();
    let session = MockIdentityProvider::issue(user_id, "someone@example.com");
    let editor = role("editor", true, false);
    let repo = Arc::new(
        MockRepository::new()
            .with_roles(vec![editor.clone()])
            .with_users(vec![user(user_id, Some("editor"))]),
    );
    let gate = AuthorizationGate::new(
        Arc::new(MockIdentityProvider::new().with_session(&session)) as IdentityState,
        repo.clone() as RepositoryState,
    );
    let tokens = SessionTokens::from(&session);

    let before = gate.resolve(&tokens).await;
    assert!(!before.capabilities().can_manage_roles);

    repo.update_role(
        editor.id,
        RoleRequest {
            name: "editor".to_string(),
            description: None,
            permissions: Permissions {
                user_management: true,
                role_management: true,
            },
        },
    )
    .await
    .unwrap();

    // The earlier state is a snapshot; only a new resolution sees the change.
    assert!(!before.capabilities().can_manage_roles);
    let after = gate.resolve(&tokens).await;
    assert!(after.capabilities().can_manage_roles);
}

// --- Pure Authorization ---

#[test]
fn test_authorize_matches_role_by_name() {
    let id = Uuid::new_v4();
    let state = authorize(
        id,
        "session@example.com",
        Ok(Some(user(id, Some("editor")))),
        Ok(vec![role("viewer", false, false), role("editor", true, true)]),
    );

    match state {
        GateState::Authorized {
            principal,
            role,
            capabilities,
        } => {
            assert_eq!(principal.email, "someone@example.com");
            assert_eq!(role.name, "editor");
            assert!(capabilities.can_manage_users && capabilities.can_manage_roles);
        }
        other => panic!("expected Authorized, got {:?}", other),
    }
}

#[test]
fn test_authorize_never_grants_on_errors() {
    let id = Uuid::new_v4();
    let state = authorize(
        id,
        "session@example.com",
        Err(StoreError::Database("down".to_string())),
        Err(StoreError::Database("down".to_string())),
    );

    assert!(state.principal().is_some());
    assert_eq!(state.capabilities(), Capabilities::none());
}

#[test]
fn test_permitted_tabs_in_display_order() {
    let both = Capabilities {
        can_manage_users: true,
        can_manage_roles: true,
    };
    assert_eq!(both.permitted_tabs(), vec![Tab::Users, Tab::Roles]);
    assert!(Capabilities::none().permitted_tabs().is_empty());
}
