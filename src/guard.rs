use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::config::AppConfig;
use crate::identity::IdentityState;
use crate::session::{
    Session, SessionTokens, clear_session_cookies, rewrite_request_cookies, write_session_cookies,
};

/// AccessRules
///
/// The path table the edge guard works from.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessRules {
    /// Path prefixes that require a session. Matched on whole segments.
    pub protected: Vec<String>,
    /// Sign-in and registration pages. Matched exactly.
    pub entry: Vec<String>,
    /// Where anonymous callers of a protected path are sent.
    pub sign_in: String,
    /// Where signed-in callers of an entry path are sent.
    pub landing: String,
}

impl Default for AccessRules {
    fn default() -> Self {
        Self {
            protected: vec!["/dashboard".to_string(), "/profile".to_string()],
            entry: vec!["/login".to_string(), "/register".to_string()],
            sign_in: "/login".to_string(),
            landing: "/dashboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Protected,
    Entry,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    PassThrough,
    Redirect(String),
}

impl AccessRules {
    /// classify
    ///
    /// `/dashboard` and `/dashboard/settings` are protected, `/dashboards` is not.
    /// `/login` and `/login/` are entry paths, `/login/help` is not.
    pub fn classify(&self, path: &str) -> RouteClass {
        if self
            .protected
            .iter()
            .any(|prefix| within_prefix(path, prefix))
        {
            return RouteClass::Protected;
        }

        let trimmed = match path.strip_suffix('/') {
            Some(rest) if !rest.is_empty() => rest,
            _ => path,
        };
        if self.entry.iter().any(|entry| entry == trimmed) {
            return RouteClass::Entry;
        }

        RouteClass::Other
    }

    /// decide
    ///
    /// The guard's decision table. Session state only matters for protected and entry paths.
    pub fn decide(&self, class: RouteClass, has_session: bool) -> GuardDecision {
        match (class, has_session) {
            (RouteClass::Protected, false) => GuardDecision::Redirect(self.sign_in.clone()),
            (RouteClass::Entry, true) => GuardDecision::Redirect(self.landing.clone()),
            _ => GuardDecision::PassThrough,
        }
    }
}

fn within_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// redirect_target
///
/// Keeps the query string of the original request on the redirect.
pub fn redirect_target(target: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{}?{}", target, query),
        None => target.to_string(),
    }
}

/// resolve_session
///
/// Asks the provider about the request's session material. Returns the session (if any) and
/// whether the presented cookies are stale. Provider errors count as "no session" and leave the
/// cookies alone.
///
/// Called once per request. A refresh token is single-use, so the resolved session is handed on
/// through the request extensions instead of being looked up again.
pub async fn resolve_session(
    identity: &IdentityState,
    tokens: &SessionTokens,
) -> (Option<Session>, bool) {
    if tokens.is_empty() {
        return (None, false);
    }
    match identity.get_session(tokens).await {
        Ok(Some(session)) => (Some(session), false),
        Ok(None) => (None, true),
        Err(e) => {
            tracing::warn!("session check failed, treating request as anonymous: {}", e);
            (None, false)
        }
    }
}

/// edge_guard
///
/// Runs before every page request. Protected paths without a session are sent to sign-in,
/// entry paths with a session are sent to the landing page, everything else passes.
///
/// A session renewed by the provider is written back on every response that leaves here,
/// redirects included. Cookies the provider no longer accepts are cleared.
pub async fn edge_guard(
    State(identity): State<IdentityState>,
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let rules = &config.access_rules;
    let class = rules.classify(request.uri().path());
    if class == RouteClass::Other {
        return next.run(request).await;
    }

    let tokens = SessionTokens::from_headers(request.headers());
    let (session, stale) = resolve_session(&identity, &tokens).await;
    let renewed = session
        .as_ref()
        .filter(|session| session.is_renewal_of(&tokens))
        .cloned();

    let decision = rules.decide(class, session.is_some());
    tracing::debug!(
        path = %request.uri().path(),
        class = ?class,
        decision = ?decision,
        renewed = renewed.is_some(),
        "edge guard"
    );

    let mut response = match decision {
        GuardDecision::PassThrough => {
            if let Some(session) = &renewed {
                rewrite_request_cookies(request.headers_mut(), session);
            }
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }
            next.run(request).await
        }
        GuardDecision::Redirect(target) => {
            Redirect::temporary(&redirect_target(&target, request.uri().query())).into_response()
        }
    };

    write_back(&mut response, renewed.as_ref(), stale, config.secure_cookies());
    response
}

/// write_back
///
/// Sends renewed tokens to the browser, or clears cookies the provider no longer accepts.
pub fn write_back(response: &mut Response, renewed: Option<&Session>, stale: bool, secure: bool) {
    if let Some(session) = renewed {
        write_session_cookies(response.headers_mut(), session, secure);
    } else if stale {
        clear_session_cookies(response.headers_mut(), secure);
    }
}
