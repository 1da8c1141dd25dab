use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::IdentityError;
use crate::session::{Session, SessionTokens};

/// Audience Supabase puts on tokens of signed-in users.
const AUDIENCE: &str = "authenticated";

/// Claims
///
/// The payload of an access token issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id, also the primary key of their `users` row.
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    pub aud: String,
}

/// SignUpOutcome
///
/// Registration result. `session` is `None` when the provider requires email confirmation
/// before the first sign-in.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user_id: Uuid,
    pub email: String,
    pub session: Option<Session>,
}

/// IdentityProvider
///
/// The authentication API of the hosted backend. Injected into the guard, the gate and the auth
/// handlers through `AppState`; nothing reaches for a global client.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validates the request's session material. `Ok(None)` means "no valid session". A returned
    /// session whose access token differs from the presented one is a renewal that must be
    /// written back to the client.
    async fn get_session(&self, tokens: &SessionTokens) -> Result<Option<Session>, IdentityError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Emails a one-time code to an existing account. Never creates an account.
    async fn sign_in_with_otp(&self, email: &str) -> Result<(), IdentityError>;

    async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, IdentityError>;

    async fn reset_password_for_email(&self, email: &str) -> Result<(), IdentityError>;
}

/// IdentityState
pub type IdentityState = Arc<dyn IdentityProvider>;

// --- GoTrue wire types ---

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(ProviderUser),
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ProviderErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(token.expires_in.unwrap_or(3600)));
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user_id: token.user.id,
            email: token.user.email.unwrap_or_default(),
            expires_at,
        }
    }
}

/// SupabaseAuthClient
///
/// `IdentityProvider` over the GoTrue REST API (`{SUPABASE_URL}/auth/v1`). Access tokens are
/// checked locally against the project's JWT secret; the network is only used to renew an
/// expired token and for the explicit auth actions.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SupabaseAuthClient {
    pub fn new(supabase_url: &str, anon_key: &str, jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUDIENCE]);
        validation.validate_exp = true;

        Self {
            http: reqwest::Client::new(),
            auth_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            &config.jwt_secret,
        )
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.auth_url, path))
            .header("apikey", &self.anon_key)
    }

    /// Passes 2xx responses through and turns everything else into an `IdentityError`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ProviderErrorBody>()
            .await
            .unwrap_or_default()
            .into_message()
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));

        if status.is_client_error() {
            Err(IdentityError::Rejected(message))
        } else {
            Err(IdentityError::Transport(message))
        }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, IdentityError> {
        let response = self
            .post(&format!("/token?grant_type={}", grant_type))
            .json(&body)
            .send()
            .await?;
        let token = Self::check(response).await?.json::<TokenResponse>().await?;
        Ok(token.into())
    }

    /// refresh
    ///
    /// Exchanges a refresh token for a new session. A refusal by the provider (revoked or
    /// already used token) is "no session", not an error.
    async fn refresh(&self, refresh_token: &str) -> Result<Option<Session>, IdentityError> {
        match self
            .token_grant(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await
        {
            Ok(session) => {
                tracing::debug!(user_id = %session.user_id, "session renewed");
                Ok(Some(session))
            }
            Err(IdentityError::Rejected(reason)) => {
                tracing::debug!("refresh token refused: {}", reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn get_session(&self, tokens: &SessionTokens) -> Result<Option<Session>, IdentityError> {
        if let Some(access_token) = &tokens.access_token {
            match decode::<Claims>(access_token, &self.decoding_key, &self.validation) {
                Ok(data) => {
                    let claims = data.claims;
                    return Ok(Some(Session {
                        access_token: access_token.clone(),
                        refresh_token: tokens.refresh_token.clone().unwrap_or_default(),
                        user_id: claims.sub,
                        email: claims.email.unwrap_or_default(),
                        expires_at: DateTime::<Utc>::from_timestamp(claims.exp as i64, 0)
                            .unwrap_or_else(Utc::now),
                    }));
                }
                // Expired: try to renew below.
                Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {}
                // Bad signature, wrong audience, garbage: never renew on a forged token.
                Err(e) => {
                    tracing::debug!("rejecting access token: {}", e);
                    return Ok(None);
                }
            }
        }

        match &tokens.refresh_token {
            Some(refresh_token) => self.refresh(refresh_token).await,
            None => Ok(None),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        self.token_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError> {
        let response = self
            .post("/signup")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = Self::check(response).await?.json::<SignUpResponse>().await?;

        Ok(match body {
            SignUpResponse::Session(token) => {
                let session: Session = token.into();
                SignUpOutcome {
                    user_id: session.user_id,
                    email: session.email.clone(),
                    session: Some(session),
                }
            }
            SignUpResponse::User(user) => SignUpOutcome {
                user_id: user.id,
                email: user.email.unwrap_or_else(|| email.to_string()),
                session: None,
            },
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .post("/logout")
            .bearer_auth(access_token)
            .send()
            .await?;
        // An already invalid token is as signed out as it gets.
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn sign_in_with_otp(&self, email: &str) -> Result<(), IdentityError> {
        let response = self
            .post("/otp")
            .json(&serde_json::json!({ "email": email, "create_user": false }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, IdentityError> {
        let response = self
            .post("/verify")
            .json(&serde_json::json!({ "type": "magiclink", "email": email, "token": token }))
            .send()
            .await?;
        let token = Self::check(response).await?.json::<TokenResponse>().await?;
        Ok(token.into())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), IdentityError> {
        let response = self
            .post("/recover")
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

// --- Mock Implementation ---

#[derive(Default)]
struct MockIdentityState {
    // access token -> session
    sessions: HashMap<String, Session>,
    // refresh token -> renewed session, consumed on first use
    renewals: HashMap<String, Session>,
    session_checks: usize,
    // email -> (password, user id)
    accounts: HashMap<String, (String, Uuid)>,
    // email -> one-time code
    otp_codes: HashMap<String, String>,
    otp_sent: Vec<String>,
    resets_sent: Vec<String>,
    signed_out: Vec<String>,
}

/// MockIdentityProvider
///
/// In-memory identity provider for tests. Sessions are issued with opaque random tokens;
/// `unavailable` makes every call fail as if the provider were unreachable.
#[derive(Default)]
pub struct MockIdentityProvider {
    state: Mutex<MockIdentityState>,
    pub unavailable: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Builds a fresh session for a subject, without registering it.
    pub fn issue(user_id: Uuid, email: &str) -> Session {
        Session {
            access_token: format!("access-{}", Uuid::new_v4().simple()),
            refresh_token: format!("refresh-{}", Uuid::new_v4().simple()),
            user_id,
            email: email.to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockIdentityState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), IdentityError> {
        if self.unavailable {
            return Err(IdentityError::Transport("mock provider unavailable".to_string()));
        }
        Ok(())
    }

    /// Registers a live session and returns it.
    pub fn with_session(self, session: &Session) -> Self {
        self.lock()
            .sessions
            .insert(session.access_token.clone(), session.clone());
        self
    }

    /// Makes `refresh_token` renew into `renewed` (which also becomes a live session). Like the
    /// real provider, the refresh token works once.
    pub fn with_renewal(self, refresh_token: &str, renewed: &Session) -> Self {
        {
            let mut state = self.lock();
            state
                .renewals
                .insert(refresh_token.to_string(), renewed.clone());
            state
                .sessions
                .insert(renewed.access_token.clone(), renewed.clone());
        }
        self
    }

    pub fn with_account(self, email: &str, password: &str, user_id: Uuid) -> Self {
        self.lock()
            .accounts
            .insert(email.to_string(), (password.to_string(), user_id));
        self
    }

    pub fn with_otp(self, email: &str, code: &str) -> Self {
        self.lock()
            .otp_codes
            .insert(email.to_string(), code.to_string());
        self
    }

    /// Number of `get_session` calls answered so far.
    pub fn session_checks(&self) -> usize {
        self.lock().session_checks
    }

    pub fn signed_out_tokens(&self) -> Vec<String> {
        self.lock().signed_out.clone()
    }

    pub fn otp_requests(&self) -> Vec<String> {
        self.lock().otp_sent.clone()
    }

    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().resets_sent.clone()
    }

    fn open_session(&self, user_id: Uuid, email: &str) -> Session {
        let session = Self::issue(user_id, email);
        self.lock()
            .sessions
            .insert(session.access_token.clone(), session.clone());
        session
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self, tokens: &SessionTokens) -> Result<Option<Session>, IdentityError> {
        self.check_available()?;
        let mut state = self.lock();
        state.session_checks += 1;
        if let Some(session) = tokens
            .access_token
            .as_ref()
            .and_then(|token| state.sessions.get(token))
        {
            return Ok(Some(session.clone()));
        }
        Ok(tokens
            .refresh_token
            .as_ref()
            .and_then(|token| state.renewals.remove(token)))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        self.check_available()?;
        let account = self.lock().accounts.get(email).cloned();
        match account {
            Some((expected, user_id)) if expected == password => {
                Ok(self.open_session(user_id, email))
            }
            _ => Err(IdentityError::Rejected(
                "Invalid login credentials".to_string(),
            )),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError> {
        self.check_available()?;
        let user_id = Uuid::new_v4();
        {
            let mut state = self.lock();
            if state.accounts.contains_key(email) {
                return Err(IdentityError::Rejected(
                    "User already registered".to_string(),
                ));
            }
            state
                .accounts
                .insert(email.to_string(), (password.to_string(), user_id));
        }
        Ok(SignUpOutcome {
            user_id,
            email: email.to_string(),
            session: Some(self.open_session(user_id, email)),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.check_available()?;
        let mut state = self.lock();
        state.sessions.remove(access_token);
        state.signed_out.push(access_token.to_string());
        Ok(())
    }

    async fn sign_in_with_otp(&self, email: &str) -> Result<(), IdentityError> {
        self.check_available()?;
        let mut state = self.lock();
        if !state.accounts.contains_key(email) {
            return Err(IdentityError::Rejected("Signups not allowed for otp".to_string()));
        }
        state.otp_sent.push(email.to_string());
        Ok(())
    }

    async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, IdentityError> {
        self.check_available()?;
        let user_id = {
            let mut state = self.lock();
            let valid = state.otp_codes.get(email).is_some_and(|code| code == token);
            if !valid {
                return Err(IdentityError::Rejected(
                    "Token has expired or is invalid".to_string(),
                ));
            }
            state.otp_codes.remove(email);
            state
                .accounts
                .get(email)
                .map(|(_, id)| *id)
                .unwrap_or_else(Uuid::new_v4)
        };
        Ok(self.open_session(user_id, email))
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), IdentityError> {
        self.check_available()?;
        self.lock().resets_sent.push(email.to_string());
        Ok(())
    }
}
