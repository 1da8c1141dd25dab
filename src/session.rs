use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const ACCESS_COOKIE: &str = "sb-access-token";
pub const REFRESH_COOKIE: &str = "sb-refresh-token";

/// Browser lifetime of both session cookies. The access token inside expires much sooner; an
/// expired one is still sent so the provider can renew it with the refresh token.
const SESSION_COOKIE_MAX_AGE: i64 = 60 * 60 * 24 * 30;

/// Session
///
/// A provider-issued proof of authentication. The console only reads it, asks the provider to
/// renew it, or asks for its invalidation.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// True when the provider handed back a different access token than the request carried.
    pub fn is_renewal_of(&self, tokens: &SessionTokens) -> bool {
        tokens.access_token.as_deref() != Some(self.access_token.as_str())
    }
}

/// SessionTokens
///
/// Whatever session material the request carried. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    /// from_headers
    ///
    /// Reads the session cookies. API clients without cookies may send the access token as
    /// `Authorization: Bearer <token>` instead.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let access_token = read_cookie(headers, ACCESS_COOKIE).or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
        });

        Self {
            access_token,
            refresh_token: read_cookie(headers, REFRESH_COOKIE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl From<&Session> for SessionTokens {
    fn from(session: &Session) -> Self {
        Self {
            access_token: Some(session.access_token.clone()),
            refresh_token: Some(session.refresh_token.clone()),
        }
    }
}

/// Finds a cookie by name across every `Cookie` header of the request.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}

fn cookie_header(name: &str, value: &str, max_age: i64, secure: bool) -> Option<HeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    match HeaderValue::from_str(&cookie) {
        Ok(header) => Some(header),
        Err(_) => {
            tracing::warn!("refusing to emit malformed {} cookie", name);
            None
        }
    }
}

/// Adds `Set-Cookie` headers carrying the session.
pub fn write_session_cookies(headers: &mut HeaderMap, session: &Session, secure: bool) {
    let cookies = [
        cookie_header(ACCESS_COOKIE, &session.access_token, SESSION_COOKIE_MAX_AGE, secure),
        cookie_header(REFRESH_COOKIE, &session.refresh_token, SESSION_COOKIE_MAX_AGE, secure),
    ];
    for cookie in cookies.into_iter().flatten() {
        headers.append(SET_COOKIE, cookie);
    }
}

/// Adds `Set-Cookie` headers expiring both session cookies.
pub fn clear_session_cookies(headers: &mut HeaderMap, secure: bool) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        if let Some(cookie) = cookie_header(name, "", 0, secure) {
            headers.append(SET_COOKIE, cookie);
        }
    }
}

/// rewrite_request_cookies
///
/// Replaces the session cookies of an in-flight request with a renewed session, keeping every
/// other cookie. Handlers further down then see the fresh access token and never spend the
/// (single-use) refresh token a second time.
pub fn rewrite_request_cookies(headers: &mut HeaderMap, session: &Session) {
    let mut pairs: Vec<String> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|pair| {
            let name = pair.split('=').next().unwrap_or_default();
            !pair.is_empty() && name != ACCESS_COOKIE && name != REFRESH_COOKIE
        })
        .map(str::to_string)
        .collect();
    pairs.push(format!("{ACCESS_COOKIE}={}", session.access_token));
    pairs.push(format!("{REFRESH_COOKIE}={}", session.refresh_token));

    match HeaderValue::from_str(&pairs.join("; ")) {
        Ok(value) => {
            headers.remove(COOKIE);
            headers.insert(COOKIE, value);
        }
        Err(_) => tracing::warn!("could not rewrite request cookies with renewed session"),
    }
}
